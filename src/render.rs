use crossterm::{
    cursor, execute, queue,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{
        self, BeginSynchronizedUpdate, Clear, ClearType, DisableLineWrap, EnableLineWrap,
        EndSynchronizedUpdate, EnterAlternateScreen, LeaveAlternateScreen,
    },
};
use std::io::{self, Write};
use titration::{Experiment, Sample, SolutionColor, Stage};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Cell {
    pub(crate) ch: char,
    pub(crate) fg: Color,
    pub(crate) bg: Color,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            fg: Color::White,
            bg: Color::Black,
        }
    }
}

pub(crate) struct CellBuffer {
    pub(crate) w: u16,
    pub(crate) h: u16,
    pub(crate) cells: Vec<Cell>,
}

impl CellBuffer {
    pub(crate) fn new(w: u16, h: u16) -> Self {
        Self {
            w,
            h,
            cells: vec![Cell::default(); (w as usize) * (h as usize)],
        }
    }
    fn idx(&self, x: u16, y: u16) -> usize {
        (y as usize) * (self.w as usize) + (x as usize)
    }
    pub(crate) fn set(&mut self, x: u16, y: u16, c: Cell) {
        if x < self.w && y < self.h {
            let i = self.idx(x, y);
            self.cells[i] = c;
        }
    }
    pub(crate) fn clear(&mut self, bg: Color) {
        self.cells.fill(Cell {
            ch: ' ',
            fg: Color::White,
            bg,
        });
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Pixel {
    pub(crate) r: u8,
    pub(crate) g: u8,
    pub(crate) b: u8,
    pub(crate) a: u8,
}

impl Pixel {
    const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

const GLASS: Pixel = Pixel::rgba(170, 200, 230, 150);
const TITRANT: Pixel = Pixel::rgba(90, 120, 255, 220);
const DROP: Pixel = Pixel::rgba(120, 160, 255, 250);
const AXIS: Pixel = Pixel::rgba(150, 150, 160, 200);
const GUIDE: Pixel = Pixel::rgba(110, 110, 120, 140);
const CURVE: Pixel = Pixel::rgba(120, 255, 170, 240);
/// Colourless solutions are drawn as faintly blue water so they stay visible.
const WATER: Pixel = Pixel::rgba(185, 215, 255, 170);

pub(crate) struct PixelCanvas {
    w: u32,
    h: u32,
    px: Vec<Pixel>,
}

impl PixelCanvas {
    pub(crate) fn new(w: u32, h: u32) -> Self {
        Self {
            w,
            h,
            px: vec![Pixel::default(); (w as usize) * (h as usize)],
        }
    }
    fn idx(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.w as usize) + (x as usize)
    }
    pub(crate) fn clear(&mut self) {
        self.px.fill(Pixel::default());
    }
    fn plot(&mut self, x: i32, y: i32, src: Pixel) {
        if x < 0 || y < 0 {
            return;
        }
        let (x, y) = (x as u32, y as u32);
        if x >= self.w || y >= self.h {
            return;
        }
        let i = self.idx(x, y);
        let dst = self.px[i];

        let sa = src.a as f32 / 255.0;
        let da = dst.a as f32 / 255.0;
        let out_a = sa + da * (1.0 - sa);
        if out_a <= 1e-6 {
            self.px[i] = Pixel::default();
            return;
        }
        let blend = |sc: u8, dc: u8| -> u8 {
            let out = (sc as f32 / 255.0 * sa + dc as f32 / 255.0 * da * (1.0 - sa)) / out_a;
            (out.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
        };
        self.px[i] = Pixel {
            r: blend(src.r, dst.r),
            g: blend(src.g, dst.g),
            b: blend(src.b, dst.b),
            a: (out_a.clamp(0.0, 1.0) * 255.0 + 0.5) as u8,
        };
    }

    fn line(&mut self, (x0, y0): (i32, i32), (x1, y1): (i32, i32), p: Pixel) {
        let steps = (x1 - x0).abs().max((y1 - y0).abs()).max(1);
        for s in 0..=steps {
            let t = s as f32 / steps as f32;
            let x = x0 as f32 + (x1 - x0) as f32 * t;
            let y = y0 as f32 + (y1 - y0) as f32 * t;
            self.plot(x.round() as i32, y.round() as i32, p);
        }
    }

    fn dotted_line(&mut self, a: (i32, i32), b: (i32, i32), p: Pixel) {
        let steps = (b.0 - a.0).abs().max((b.1 - a.1).abs()).max(1);
        for s in (0..=steps).step_by(3) {
            let t = s as f32 / steps as f32;
            let x = a.0 as f32 + (b.0 - a.0) as f32 * t;
            let y = a.1 as f32 + (b.1 - a.1) as f32 * t;
            self.plot(x.round() as i32, y.round() as i32, p);
        }
    }
}

pub(crate) struct Terminal {
    out: io::Stdout,
    pub(crate) cols: u16,
    pub(crate) rows: u16,
    prev: CellBuffer,
    pub(crate) cur: CellBuffer,
    pub(crate) canvas: PixelCanvas,
}

impl Terminal {
    pub(crate) fn begin() -> anyhow::Result<Self> {
        let mut out = io::stdout();
        execute!(
            out,
            EnterAlternateScreen,
            cursor::Hide,
            DisableLineWrap,
            terminal::Clear(ClearType::All)
        )?;
        terminal::enable_raw_mode()?;

        let (cols, rows) = terminal::size()?;
        Ok(Self {
            out,
            cols,
            rows,
            prev: CellBuffer::new(cols, rows),
            cur: CellBuffer::new(cols, rows),
            // Braille: 2×4 pixels per cell
            canvas: PixelCanvas::new(cols as u32 * 2, rows as u32 * 4),
        })
    }

    pub(crate) fn end(&mut self) -> anyhow::Result<()> {
        queue!(
            self.out,
            BeginSynchronizedUpdate,
            ResetColor,
            Clear(ClearType::All),
            cursor::Show,
            EnableLineWrap,
            EndSynchronizedUpdate,
            LeaveAlternateScreen
        )?;
        self.out.flush()?;
        terminal::disable_raw_mode()?;
        Ok(())
    }

    pub(crate) fn resize_if_needed(&mut self) -> anyhow::Result<bool> {
        let (c, r) = terminal::size()?;
        if c == self.cols && r == self.rows {
            return Ok(false);
        }
        self.cols = c;
        self.rows = r;
        self.prev = CellBuffer::new(c, r);
        self.cur = CellBuffer::new(c, r);
        self.canvas = PixelCanvas::new(c as u32 * 2, r as u32 * 4);
        queue!(self.out, Clear(ClearType::All))?;
        Ok(true)
    }

    /// Writes only the cells that changed since the previous frame.
    pub(crate) fn present(&mut self) -> anyhow::Result<()> {
        queue!(self.out, BeginSynchronizedUpdate)?;

        let mut last_fg = None;
        let mut last_bg = None;
        for y in 0..self.rows {
            for x in 0..self.cols {
                let i = self.cur.idx(x, y);
                let c = self.cur.cells[i];
                if c == self.prev.cells[i] {
                    continue;
                }
                queue!(self.out, cursor::MoveTo(x, y))?;
                if last_fg != Some(c.fg) {
                    queue!(self.out, SetForegroundColor(c.fg))?;
                    last_fg = Some(c.fg);
                }
                if last_bg != Some(c.bg) {
                    queue!(self.out, SetBackgroundColor(c.bg))?;
                    last_bg = Some(c.bg);
                }
                queue!(self.out, Print(c.ch))?;
            }
        }

        queue!(self.out, ResetColor, EndSynchronizedUpdate)?;
        self.out.flush()?;
        self.prev.cells.copy_from_slice(&self.cur.cells);
        Ok(())
    }
}

/* -----------------------------
   Braille encoding: 2×4 pixels -> U+2800..U+28FF
------------------------------ */

fn braille_bit(dx: u32, dy: u32) -> u8 {
    match (dx, dy) {
        (0, 0) => 0x01,
        (0, 1) => 0x02,
        (0, 2) => 0x04,
        (0, 3) => 0x40,
        (1, 0) => 0x08,
        (1, 1) => 0x10,
        (1, 2) => 0x20,
        (1, 3) => 0x80,
        _ => 0x00,
    }
}

pub(crate) fn canvas_to_cells(canvas: &PixelCanvas, out: &mut CellBuffer, enable_color: bool, bg: Color) {
    for cy in 0..out.h as u32 {
        for cx in 0..out.w as u32 {
            let mut mask: u8 = 0;
            let (mut sr, mut sg, mut sb, mut ink) = (0u32, 0u32, 0u32, 0u32);

            for dy in 0..4 {
                for dx in 0..2 {
                    let (x, y) = (cx * 2 + dx, cy * 4 + dy);
                    if x >= canvas.w || y >= canvas.h {
                        continue;
                    }
                    let p = canvas.px[canvas.idx(x, y)];
                    if p.a >= 32 {
                        mask |= braille_bit(dx, dy);
                        sr += p.r as u32;
                        sg += p.g as u32;
                        sb += p.b as u32;
                        ink += 1;
                    }
                }
            }
            if mask == 0 {
                continue;
            }

            let fg = if enable_color {
                Color::Rgb {
                    r: (sr / ink) as u8,
                    g: (sg / ink) as u8,
                    b: (sb / ink) as u8,
                }
            } else {
                Color::White
            };
            out.set(
                cx as u16,
                cy as u16,
                Cell {
                    ch: char::from_u32(0x2800 + mask as u32).unwrap_or(' '),
                    fg,
                    bg,
                },
            );
        }
    }
}

/// Region of the braille canvas, in sub-pixels.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Viewport {
    pub(crate) x: i32,
    pub(crate) y: i32,
    pub(crate) w: i32,
    pub(crate) h: i32,
}

/* -----------------------------
   Apparatus: burette, flask, drops
------------------------------ */

const SCENE_X: (f64, f64) = (-1.0, 1.0);
const SCENE_Y: (f64, f64) = (-0.6, 3.1);

const BURETTE_BOTTOM: f64 = 1.5;
const BURETTE_TOP: f64 = 3.0;
const BURETTE_HALF_W: f64 = 0.08;
const FLASK_BASE_HALF_W: f64 = 0.4;
const FLASK_CONE_H: f64 = 0.8;
const FLASK_NECK_HALF_W: f64 = 0.15;
const FLASK_NECK_H: f64 = 0.4;

/// Uniform scene-to-pixel mapping centred in a viewport.
struct SceneMap {
    scale: f64,
    ox: f64,
    oy: f64,
}

impl SceneMap {
    fn fit(vp: Viewport) -> Self {
        let sx = vp.w as f64 / (SCENE_X.1 - SCENE_X.0);
        let sy = vp.h as f64 / (SCENE_Y.1 - SCENE_Y.0);
        let scale = sx.min(sy);
        let used_w = (SCENE_X.1 - SCENE_X.0) * scale;
        let used_h = (SCENE_Y.1 - SCENE_Y.0) * scale;
        Self {
            scale,
            ox: vp.x as f64 + (vp.w as f64 - used_w) / 2.0,
            oy: vp.y as f64 + (vp.h as f64 - used_h) / 2.0,
        }
    }

    fn px(&self, x: f64, y: f64) -> (i32, i32) {
        (
            (self.ox + (x - SCENE_X.0) * self.scale).round() as i32,
            (self.oy + (SCENE_Y.1 - y) * self.scale).round() as i32,
        )
    }

    /// Scene height at the centre of pixel row `py`.
    fn y_at(&self, py: i32) -> f64 {
        SCENE_Y.1 - (py as f64 + 0.5 - self.oy) / self.scale
    }

    /// Fills every row between `y_lo` and `y_hi` with a span of half-width `half_w(y)`.
    fn fill_profile(
        &self,
        canvas: &mut PixelCanvas,
        y_lo: f64,
        y_hi: f64,
        half_w: impl Fn(f64) -> f64,
        p: Pixel,
    ) {
        if !(y_lo < y_hi) {
            return;
        }
        let (_, top) = self.px(0.0, y_hi);
        let (_, bottom) = self.px(0.0, y_lo);
        for py in top..=bottom {
            let y = self.y_at(py).clamp(y_lo, y_hi);
            let hw = half_w(y);
            let (x0, _) = self.px(-hw, y);
            let (x1, _) = self.px(hw, y);
            for px in x0..=x1 {
                canvas.plot(px, py, p);
            }
        }
    }

    /// Draws only the left and right edges of the same kind of profile.
    fn outline_profile(
        &self,
        canvas: &mut PixelCanvas,
        y_lo: f64,
        y_hi: f64,
        half_w: impl Fn(f64) -> f64,
        p: Pixel,
    ) {
        if !(y_lo < y_hi) {
            return;
        }
        let (_, top) = self.px(0.0, y_hi);
        let (_, bottom) = self.px(0.0, y_lo);
        for py in top..=bottom {
            let y = self.y_at(py).clamp(y_lo, y_hi);
            let hw = half_w(y);
            let (x0, _) = self.px(-hw, y);
            let (x1, _) = self.px(hw, y);
            canvas.plot(x0 - 1, py, p);
            canvas.plot(x1 + 1, py, p);
        }
    }
}

fn flask_half_width(bottom: f64, y: f64) -> f64 {
    let h = y - bottom;
    if h >= FLASK_CONE_H {
        FLASK_NECK_HALF_W
    } else {
        (FLASK_BASE_HALF_W * (1.0 - h / FLASK_CONE_H)).max(FLASK_NECK_HALF_W)
    }
}

fn liquid_pixel(color: SolutionColor) -> Pixel {
    if color.is_colorless() {
        return WATER;
    }
    let (r, g, b) = color.to_rgb8();
    Pixel::rgba(r, g, b, 210)
}

pub(crate) fn draw_apparatus(canvas: &mut PixelCanvas, lab: &Experiment, vp: Viewport) {
    let map = SceneMap::fit(vp);
    let st = lab.state();
    let cfg = st.config();
    let bottom = cfg.flask_bottom_y;

    // burette
    let full = (st.burette_remaining_ml() / cfg.burette_capacity_ml).clamp(0.0, 1.0);
    let liquid_top = BURETTE_BOTTOM + (BURETTE_TOP - BURETTE_BOTTOM) * full;
    if full > 0.0 {
        map.fill_profile(canvas, BURETTE_BOTTOM, liquid_top, |_| BURETTE_HALF_W - 0.01, TITRANT);
    }
    map.outline_profile(canvas, BURETTE_BOTTOM, BURETTE_TOP, |_| BURETTE_HALF_W, GLASS);
    map.outline_profile(
        canvas,
        cfg.tip_y,
        BURETTE_BOTTOM,
        |y| 0.01 + 0.03 * (y - cfg.tip_y) / (BURETTE_BOTTOM - cfg.tip_y).max(1e-6),
        GLASS,
    );

    // valve marker beside the tip
    let (vx, vy) = map.px(BURETTE_HALF_W + 0.05, (cfg.tip_y + BURETTE_BOTTOM) / 2.0);
    let valve = if st.valve_open() {
        Pixel::rgba(120, 255, 140, 255)
    } else {
        Pixel::rgba(255, 110, 110, 255)
    };
    for d in 0..3 {
        canvas.plot(vx + d, vy, valve);
        canvas.plot(vx + d, vy + 1, valve);
    }

    // flask
    let surface = st.surface_y();
    map.fill_profile(
        canvas,
        bottom,
        surface,
        |y| flask_half_width(bottom, y) - 0.02,
        liquid_pixel(st.solution_color()),
    );
    map.outline_profile(
        canvas,
        bottom,
        bottom + FLASK_CONE_H + FLASK_NECK_H,
        |y| flask_half_width(bottom, y),
        GLASS,
    );
    let (fx0, fy) = map.px(-FLASK_BASE_HALF_W, bottom);
    let (fx1, _) = map.px(FLASK_BASE_HALF_W, bottom);
    canvas.line((fx0 - 1, fy + 1), (fx1 + 1, fy + 1), GLASS);

    for d in lab.droplets().droplets() {
        let (x, y) = map.px(d.x, d.y);
        canvas.plot(x, y, DROP);
        canvas.plot(x, y + 1, DROP);
    }

    let life = cfg.particle_life;
    for p in lab.droplets().particles() {
        let (x, y) = map.px(p.x, p.y);
        let a = (255.0 * (p.life / life).clamp(0.25, 1.0)) as u8;
        canvas.plot(x, y, Pixel { a, ..DROP });
    }
}

/* -----------------------------
   pH chart
------------------------------ */

/// Volume span of the chart: twice the equivalence volume, growing if the run goes further.
pub(crate) fn chart_volume_span(lab: &Experiment) -> f64 {
    let st = lab.state();
    (st.equivalence_volume_ml() * 2.0)
        .max(st.volume_ml() * 1.05)
        .min(st.config().burette_capacity_ml)
        .max(1.0)
}

fn chart_point(vp: Viewport, span: f64, s: &Sample) -> (i32, i32) {
    let tx = (s.volume_ml / span).clamp(0.0, 1.0);
    let ty = (s.ph / 14.0).clamp(0.0, 1.0);
    (
        vp.x + (tx * (vp.w - 1) as f64).round() as i32,
        vp.y + vp.h - 1 - (ty * (vp.h - 1) as f64).round() as i32,
    )
}

pub(crate) fn draw_chart(canvas: &mut PixelCanvas, lab: &Experiment, vp: Viewport) {
    let st = lab.state();
    let span = chart_volume_span(lab);

    let origin = (vp.x, vp.y + vp.h - 1);
    canvas.line(origin, (vp.x + vp.w - 1, vp.y + vp.h - 1), AXIS);
    canvas.line(origin, (vp.x, vp.y), AXIS);

    let neutral = |v: f64| Sample { volume_ml: v, ph: 7.0 };
    canvas.dotted_line(
        chart_point(vp, span, &neutral(0.0)),
        chart_point(vp, span, &neutral(span)),
        GUIDE,
    );
    let veq = st.equivalence_volume_ml();
    if veq <= span {
        let top = chart_point(vp, span, &Sample { volume_ml: veq, ph: 14.0 });
        let base = chart_point(vp, span, &Sample { volume_ml: veq, ph: 0.0 });
        canvas.dotted_line(top, base, GUIDE);
    }

    let start = Sample {
        volume_ml: 0.0,
        ph: st.starting_ph(),
    };
    let mut prev = chart_point(vp, span, &start);
    canvas.plot(prev.0, prev.1, CURVE);
    for s in st.history() {
        let p = chart_point(vp, span, s);
        canvas.line(prev, p, CURVE);
        prev = p;
    }
}

/* -----------------------------
   Text overlay
------------------------------ */

pub(crate) fn draw_text(buf: &mut CellBuffer, x: u16, y: u16, s: &str, fg: Color, bg: Color) {
    for (i, ch) in s.chars().enumerate() {
        let xx = x.saturating_add(i as u16);
        if xx >= buf.w || y >= buf.h {
            break;
        }
        buf.set(xx, y, Cell { ch, fg, bg });
    }
}

fn bar(value01: f64, width: usize) -> String {
    let fill = (value01.clamp(0.0, 1.0) * width as f64 + 0.5) as usize;
    let mut s = String::with_capacity(width + 2);
    s.push('[');
    for i in 0..width {
        s.push(if i < fill { '█' } else { ' ' });
    }
    s.push(']');
    s
}

fn stage_color(stage: Stage) -> Color {
    match stage {
        Stage::Acidic => Color::Rgb { r: 255, g: 140, b: 120 },
        Stage::NearEquivalence => Color::Rgb { r: 240, g: 230, b: 140 },
        Stage::Basic => Color::Rgb { r: 150, g: 170, b: 255 },
    }
}

pub(crate) fn chart_labels(buf: &mut CellBuffer, lab: &Experiment, vp_cells: (u16, u16, u16, u16)) {
    let (x, y, w, h) = vp_cells;
    let fg = Color::Grey;
    let bg = Color::Black;
    let span = chart_volume_span(lab);

    draw_text(buf, x.saturating_sub(3), y, "14", fg, bg);
    draw_text(buf, x.saturating_sub(2), y + h / 2, "7", fg, bg);
    draw_text(buf, x.saturating_sub(2), y + h.saturating_sub(1), "0", fg, bg);
    draw_text(buf, x, y.saturating_sub(1), "pH", fg, bg);
    draw_text(buf, x, y + h, "0", fg, bg);
    let right = format!("{span:.0} mL");
    draw_text(
        buf,
        (x + w).saturating_sub(right.len() as u16),
        y + h,
        &right,
        fg,
        bg,
    );

    let veq = lab.state().equivalence_volume_ml();
    if veq <= span && w > 0 {
        let cx = x + ((veq / span) * (w - 1) as f64).round() as u16;
        let label = format!("Veq {veq:.1}");
        draw_text(buf, cx.saturating_sub(label.len() as u16 / 2), y + h, &label, Color::Yellow, bg);
    }
}

pub(crate) fn ui_overlay(buf: &mut CellBuffer, lab: &Experiment) {
    let bg = Color::Black;
    let fg = Color::White;
    let st = lab.state();
    let p = st.parameters();

    let title = format!(
        "Titration  |  {}  |  model: {}",
        st.reaction().label(),
        st.model().name()
    );
    draw_text(buf, 1, 0, &title, fg, bg);

    let stage = st.stage();
    let line = format!(
        "pH {:>6.2}   {:>7.2} mL   {:>5} drops   ",
        st.ph(),
        st.volume_ml(),
        st.total_drops_delivered()
    );
    draw_text(buf, 1, 1, &line, fg, bg);
    draw_text(buf, 1 + line.chars().count() as u16, 1, stage.label(), stage_color(stage), bg);

    let sim = lab.droplets();
    let cfg = st.config();
    let flow01 = (sim.flow_rate() - cfg.flow_min) / (cfg.flow_max - cfg.flow_min);
    let valve = if st.is_finished() {
        "EMPTY"
    } else if st.valve_open() {
        "open"
    } else {
        "closed"
    };
    let line = format!(
        "Valve {:<6} Flow {} {:>4.1}   Indicator {}   Acid {:.3} M x {:.1} mL   Base {:.3} M",
        valve,
        bar(flow01, 10),
        sim.flow_rate(),
        if st.indicator_active() { "on " } else { "off" },
        p.acid_molarity,
        p.acid_volume_ml,
        p.base_molarity
    );
    draw_text(buf, 1, 2, &line, fg, bg);

    let help = "Keys: space valve | ↑↓ flow | i indicator | 1-4 reaction | m model | r reset | h help | q quit";
    draw_text(buf, 1, buf.h.saturating_sub(1), help, Color::Grey, bg);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn braille_full_cell() {
        let mut c = PixelCanvas::new(2, 4);
        for y in 0..4 {
            for x in 0..2 {
                c.plot(x, y, CURVE);
            }
        }
        let mut buf = CellBuffer::new(1, 1);
        canvas_to_cells(&c, &mut buf, false, Color::Black);
        assert_eq!(buf.cells[0].ch, '\u{28FF}');
    }

    #[test]
    fn flask_narrows_to_neck() {
        assert_eq!(flask_half_width(-0.5, -0.5), FLASK_BASE_HALF_W);
        assert_eq!(flask_half_width(-0.5, 0.5), FLASK_NECK_HALF_W);
        assert!(flask_half_width(-0.5, -0.1) < FLASK_BASE_HALF_W);
    }

    #[test]
    fn chart_maps_corners() {
        let vp = Viewport { x: 10, y: 0, w: 101, h: 57 };
        assert_eq!(chart_point(vp, 100.0, &Sample { volume_ml: 0.0, ph: 0.0 }), (10, 56));
        assert_eq!(chart_point(vp, 100.0, &Sample { volume_ml: 100.0, ph: 14.0 }), (110, 0));
    }

    #[test]
    fn bar_fills_proportionally() {
        assert_eq!(bar(0.5, 4), "[██  ]");
        assert_eq!(bar(2.0, 2), "[██]");
    }
}
