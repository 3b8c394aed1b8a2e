use crate::input::{collect_input_nonblocking, map_event_to_action, Knob, UiAction};
use crate::render::{
    canvas_to_cells, chart_labels, draw_apparatus, draw_chart, draw_text, ui_overlay, Cell,
    Terminal, Viewport,
};
use crossterm::style::Color;
use std::cmp::{max, min};
use std::time::{Duration, Instant};
use titration::{Command, Experiment, ExperimentParameters, Settings};

/// Simulation step; drop spawn probabilities are per step.
const SIM_STEP: Duration = Duration::from_micros(16_667);
/// Upper bound on catch-up steps after a stall.
const MAX_STEPS_PER_FRAME: u32 = 8;

const MOLARITY_STEP: f64 = 0.01;
const MOLARITY_RANGE: (f64, f64) = (0.01, 2.0);
const VOLUME_STEP_ML: f64 = 5.0;
const VOLUME_RANGE_ML: (f64, f64) = (5.0, 200.0);

pub(crate) struct App {
    settings: Settings,
    lab: Experiment,
    term: Terminal,
    show_help: bool,
    should_quit: bool,
}

impl App {
    fn init(settings: Settings) -> anyhow::Result<Self> {
        let lab = Experiment::new(&settings)?;
        let term = Terminal::begin()?;
        Ok(Self {
            settings,
            lab,
            term,
            show_help: false,
            should_quit: false,
        })
    }

    fn run(&mut self) -> anyhow::Result<()> {
        let fps = self.settings.fps_cap.clamp(10, 240);
        let frame_dt = Duration::from_secs_f32(1.0 / fps as f32);

        let mut last_frame = Instant::now();
        let mut sim_accum = Duration::ZERO;

        while !self.should_quit {
            let frame_start = Instant::now();
            self.term.resize_if_needed()?;

            for ev in collect_input_nonblocking(frame_dt)? {
                if let Some(action) = map_event_to_action(self.show_help, ev) {
                    self.handle(action);
                }
                if self.should_quit {
                    break;
                }
            }

            // sim fixed-step
            let now = Instant::now();
            sim_accum = sim_accum.saturating_add(now.saturating_duration_since(last_frame));
            last_frame = now;

            let mut steps = 0;
            while sim_accum >= SIM_STEP && steps < MAX_STEPS_PER_FRAME {
                self.lab.tick(SIM_STEP.as_secs_f64());
                sim_accum -= SIM_STEP;
                steps += 1;
            }
            if steps == MAX_STEPS_PER_FRAME {
                sim_accum = Duration::ZERO;
            }

            self.render_frame()?;
            spin_sleep(frame_dt, frame_start);
        }

        self.term.end()?;
        Ok(())
    }

    fn handle(&mut self, action: UiAction) {
        match action {
            UiAction::Quit => self.should_quit = true,
            UiAction::HelpToggle => self.show_help = !self.show_help,
            // Rejections are logged by the experiment and change nothing.
            UiAction::Lab(cmd) => {
                let _ = self.lab.apply(cmd);
            }
            UiAction::Nudge(knob, dir) => {
                let p = nudged(*self.lab.state().parameters(), knob, dir);
                let _ = self.lab.apply(Command::SetParameters(p));
            }
        }
    }

    fn render_frame(&mut self) -> anyhow::Result<()> {
        let bg = Color::Black;
        self.term.cur.clear(bg);
        self.term.canvas.clear();

        let cols = self.term.cols as i32;
        let rows = self.term.rows as i32;

        // HUD on top, key line at the bottom, apparatus left, chart right.
        let top = 4;
        let body_h = max(rows - top - 2, 1);
        let scene_w = min(max(24, cols * 2 / 5), cols);

        let scene = Viewport {
            x: 0,
            y: top * 4,
            w: scene_w * 2,
            h: body_h * 4,
        };
        draw_apparatus(&mut self.term.canvas, &self.lab, scene);

        let chart_x = scene_w + 4;
        let chart_w = cols - chart_x - 2;
        let chart_h = body_h - 2;
        let has_chart = chart_w >= 10 && chart_h >= 4;
        if has_chart {
            let chart = Viewport {
                x: chart_x * 2,
                y: (top + 1) * 4,
                w: chart_w * 2,
                h: chart_h * 4,
            };
            draw_chart(&mut self.term.canvas, &self.lab, chart);
        }

        canvas_to_cells(
            &self.term.canvas,
            &mut self.term.cur,
            self.settings.enable_color,
            bg,
        );

        if has_chart {
            chart_labels(
                &mut self.term.cur,
                &self.lab,
                (chart_x as u16, (top + 1) as u16, chart_w as u16, chart_h as u16),
            );
        }
        ui_overlay(&mut self.term.cur, &self.lab);

        if self.show_help {
            self.draw_center_box(
                "Keys",
                "Space       open / close the burette valve\n\
                 Up / Down   flow rate (drop frequency)\n\
                 I           toggle phenolphthalein indicator\n\
                 1 2 3 4     reaction: SA/SB, WA/SB, SA/WB, WA/WB\n\
                 M           equilibrium / logistic pH model\n\
                 A / Z       acid molarity up / down\n\
                 B / N       base molarity up / down\n\
                 V / C       acid volume up / down\n\
                 R           reset the flask\n\n\
                 H or Esc to close, Q to quit.",
            );
        }

        self.term.present()?;
        Ok(())
    }

    fn draw_center_box(&mut self, title: &str, body: &str) {
        let w = self.term.cols;
        let h = self.term.rows;
        let bw = min(56, w.saturating_sub(4));
        let bh = min(17, h.saturating_sub(2));
        if bw < 4 || bh < 3 {
            return;
        }
        let x0 = (w - bw) / 2;
        let y0 = (h - bh) / 2;

        let edge = |ch| Cell {
            ch,
            fg: Color::White,
            bg: Color::Black,
        };
        let buf = &mut self.term.cur;
        for y in y0..y0 + bh {
            for x in x0..x0 + bw {
                let top_or_bottom = y == y0 || y == y0 + bh - 1;
                let side = x == x0 || x == x0 + bw - 1;
                let ch = match (top_or_bottom, side) {
                    (true, true) => '+',
                    (true, false) => '─',
                    (false, true) => '│',
                    (false, false) => ' ',
                };
                buf.set(x, y, edge(ch));
            }
        }

        draw_text(buf, x0 + 2, y0, &format!(" {title} "), Color::Yellow, Color::Black);
        for (i, line) in body.lines().enumerate() {
            let y = y0 + 2 + i as u16;
            if y + 1 >= y0 + bh {
                break;
            }
            let line: String = line.chars().take(bw as usize - 4).collect();
            draw_text(buf, x0 + 2, y, &line, Color::White, Color::Black);
        }
    }
}

fn nudged(mut p: ExperimentParameters, knob: Knob, dir: i8) -> ExperimentParameters {
    let d = f64::from(dir);
    match knob {
        Knob::AcidMolarity => {
            p.acid_molarity = step(p.acid_molarity, d * MOLARITY_STEP, MOLARITY_RANGE)
        }
        Knob::BaseMolarity => {
            p.base_molarity = step(p.base_molarity, d * MOLARITY_STEP, MOLARITY_RANGE)
        }
        Knob::AcidVolume => {
            p.acid_volume_ml = step(p.acid_volume_ml, d * VOLUME_STEP_ML, VOLUME_RANGE_ML)
        }
    }
    p
}

/// Steps and rounds to the step grid so repeated presses don't drift.
fn step(value: f64, delta: f64, (lo, hi): (f64, f64)) -> f64 {
    let grid = delta.abs();
    let next = ((value + delta) / grid).round() * grid;
    next.clamp(lo, hi)
}

fn spin_sleep(target: Duration, start: Instant) {
    let end = start + target;
    loop {
        let t = Instant::now();
        if t >= end {
            break;
        }
        if end - t > Duration::from_millis(2) {
            std::thread::sleep(Duration::from_millis(1));
        } else {
            std::hint::spin_loop();
        }
    }
}

pub(crate) fn run(settings: Settings) -> anyhow::Result<()> {
    let mut app = App::init(settings)?;
    let res = app.run();
    if res.is_err() {
        // leave the alternate screen before the error is printed
        let _ = app.term.end();
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nudges_stay_on_grid_and_in_range() {
        let p = ExperimentParameters::default();
        let up = nudged(p, Knob::AcidMolarity, 1);
        assert!((up.acid_molarity - 0.11).abs() < 1e-12);
        assert_eq!(up.base_molarity, p.base_molarity);

        let mut low = p;
        low.acid_volume_ml = 5.0;
        assert_eq!(nudged(low, Knob::AcidVolume, -1).acid_volume_ml, 5.0);

        let mut high = p;
        high.base_molarity = 2.0;
        assert_eq!(nudged(high, Knob::BaseMolarity, 1).base_molarity, 2.0);
    }

    #[test]
    fn repeated_steps_do_not_drift() {
        let mut v = 0.1;
        for _ in 0..30 {
            v = step(v, MOLARITY_STEP, MOLARITY_RANGE);
        }
        for _ in 0..30 {
            v = step(v, -MOLARITY_STEP, MOLARITY_RANGE);
        }
        assert!((v - 0.1).abs() < 1e-12);
    }
}
