//! Falling drops between the burette tip and the flask, plus cosmetic splashes.
//!
//! A drop is spawned at the tip with zero velocity, falls under constant
//! acceleration, and counts as delivered the moment it passes below the
//! current liquid surface. Each drop is delivered exactly once.

use crate::config::SimulationConfig;
use crate::error::Result;
use crate::state::{Sample, TitrationState};
use log::debug;
use rand::Rng;

/// Upper bound on live splash particles; oldest are dropped first.
const MAX_PARTICLES: usize = 2048;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Droplet {
    pub x: f64,
    pub y: f64,
    pub vertical_velocity: f64,
    /// Simulator clock at spawn [s].
    pub spawned_at: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    /// Remaining lifetime [s].
    pub life: f64,
}

/// A drop that reached the liquid during a tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Arrival {
    pub sample: Sample,
    /// Time from spawn to surface crossing [s], resolved inside the tick.
    pub fall_time: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    pub spawned: bool,
    pub arrivals: Vec<Arrival>,
}

#[derive(Clone, Debug)]
pub struct DropletSimulator {
    config: SimulationConfig,
    flow: f64,
    drop_rate: f64,
    clock: f64,
    droplets: Vec<Droplet>,
    particles: Vec<Particle>,
}

impl DropletSimulator {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let flow = config.default_flow;
        let drop_rate = config.drop_rate_for_flow(flow)?;
        Ok(Self {
            config,
            flow,
            drop_rate,
            clock: 0.0,
            droplets: Vec::new(),
            particles: Vec::new(),
        })
    }

    /// Rejects flows outside the configured range and keeps the old rate.
    pub fn set_flow_rate(&mut self, flow: f64) -> Result<()> {
        self.drop_rate = self.config.drop_rate_for_flow(flow)?;
        self.flow = flow;
        Ok(())
    }

    /// Nudges the flow, clamped to the configured range. Returns the new flow.
    pub fn adjust_flow(&mut self, delta: f64) -> f64 {
        let flow = (self.flow + delta).clamp(self.config.flow_min, self.config.flow_max);
        if let Ok(rate) = self.config.drop_rate_for_flow(flow) {
            self.flow = flow;
            self.drop_rate = rate;
        }
        self.flow
    }

    pub fn flow_rate(&self) -> f64 {
        self.flow
    }

    /// Spawn probability per tick.
    pub fn drop_rate(&self) -> f64 {
        self.drop_rate
    }

    pub fn droplets(&self) -> &[Droplet] {
        &self.droplets
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn in_flight(&self) -> usize {
        self.droplets.len()
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Drops every droplet and particle. The flow setting is kept.
    pub fn clear(&mut self) {
        self.droplets.clear();
        self.particles.clear();
        self.clock = 0.0;
    }

    /// Places a resting droplet at `(x, y)`.
    pub fn spawn_droplet(&mut self, x: f64, y: f64) {
        self.droplets.push(Droplet {
            x,
            y,
            vertical_velocity: 0.0,
            spawned_at: self.clock,
        });
    }

    /// Advances the scene by `dt` seconds.
    ///
    /// Order: particles age, the valve may spawn one drop at the tip, then
    /// every drop falls and is checked against the surface as it stands after
    /// the drops before it have landed.
    pub fn tick<R: Rng + ?Sized>(
        &mut self,
        dt: f64,
        state: &mut TitrationState,
        rng: &mut R,
    ) -> TickReport {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        let mut report = TickReport::default();

        self.step_particles(dt);

        if state.valve_open() && self.has_room(state) && rng.gen::<f64>() < self.drop_rate {
            let jitter = (rng.gen::<f64>() - 0.5) * 2.0 * self.config.tip_jitter;
            self.spawn_droplet(self.config.tip_x + jitter, self.config.tip_y);
            report.spawned = true;
        }

        let a = self.config.gravity;
        let mut i = 0;
        while i < self.droplets.len() {
            let d = &mut self.droplets[i];
            let (y0, v0) = (d.y, d.vertical_velocity);
            d.y = y0 + v0 * dt + 0.5 * a * dt * dt;
            d.vertical_velocity = v0 + a * dt;

            let surface = state.surface_y();
            if d.y >= surface {
                i += 1;
                continue;
            }

            let d = self.droplets.remove(i);
            let offset = crossing_offset(y0 - surface, v0, a, dt);
            let fall_time = self.clock + offset - d.spawned_at;
            let sample = state.apply_drop();
            self.splash(d.x, surface, rng);
            report.arrivals.push(Arrival { sample, fall_time });
        }

        self.clock += dt;
        if !report.arrivals.is_empty() {
            debug!(
                "{} drop(s) landed, {} in flight",
                report.arrivals.len(),
                self.droplets.len()
            );
        }
        report
    }

    /// Whether one more drop fits in what is left of the burette.
    fn has_room(&self, state: &TitrationState) -> bool {
        state.total_drops_delivered() + self.droplets.len() as u64 + 1 <= state.max_drops()
    }

    fn step_particles(&mut self, dt: f64) {
        let a = self.config.gravity;
        for p in self.particles.iter_mut() {
            p.life -= dt;
            p.vy += a * dt;
            p.x += p.vx * dt;
            p.y += p.vy * dt;
        }
        self.particles.retain(|p| p.life > 0.0);
    }

    fn splash<R: Rng + ?Sized>(&mut self, x: f64, surface: f64, rng: &mut R) {
        let c = &self.config;
        for _ in 0..c.splash_count {
            let ang = (rng.gen::<f64>() - 0.5) * 2.2;
            let sp = c.splash_speed * (0.5 + rng.gen::<f64>() * 0.5);
            self.particles.push(Particle {
                x,
                y: surface,
                vx: ang.sin() * sp * 0.5,
                vy: sp * (0.4 + rng.gen::<f64>() * 0.6),
                life: c.particle_life * (0.6 + rng.gen::<f64>() * 0.4),
            });
        }
        if self.particles.len() > MAX_PARTICLES {
            let excess = self.particles.len() - MAX_PARTICLES;
            self.particles.drain(..excess);
        }
    }
}

/// Time into a step at which a body at height `h` above the surface, moving
/// with velocity `v` under acceleration `a < 0`, reaches the surface.
fn crossing_offset(h: f64, v: f64, a: f64, dt: f64) -> f64 {
    if h <= 0.0 {
        return 0.0;
    }
    let disc = v * v - 2.0 * a * h;
    let s = (-v - disc.sqrt()) / a;
    s.clamp(0.0, dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chemistry::{ChemistryModel, ExperimentParameters, ReactionType};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn setup(config: SimulationConfig) -> (DropletSimulator, TitrationState, StdRng) {
        let sim = DropletSimulator::new(config).unwrap();
        let st = TitrationState::new(
            config,
            ExperimentParameters::default(),
            ReactionType::StrongAcidStrongBase,
            ChemistryModel::default(),
        )
        .unwrap();
        (sim, st, StdRng::seed_from_u64(7))
    }

    #[test]
    fn free_fall_matches_projectile_motion() {
        let config = SimulationConfig::default();
        let (mut sim, mut st, mut rng) = setup(config);
        sim.spawn_droplet(0.0, config.tip_y);

        let h = config.tip_y - st.surface_y();
        let expected = (2.0 * h / config.gravity.abs()).sqrt();
        let dt = 1.0 / 60.0;

        let mut ticks = 0u32;
        let arrival = loop {
            ticks += 1;
            let report = sim.tick(dt, &mut st, &mut rng);
            if let Some(a) = report.arrivals.first() {
                assert_eq!(report.arrivals.len(), 1);
                break *a;
            }
            assert!(ticks < 10_000, "droplet never arrived");
        };

        assert!((arrival.fall_time - expected).abs() < 1e-9, "{} vs {expected}", arrival.fall_time);
        let t = ticks as f64 * dt;
        assert!(t - dt < expected + 1e-9 && expected <= t + 1e-9);
        assert_eq!(st.total_drops_delivered(), 1);
        assert!(sim.droplets().is_empty());
    }

    #[test]
    fn oversized_step_still_delivers_exactly_once() {
        let config = SimulationConfig::default();
        let (mut sim, mut st, mut rng) = setup(config);
        sim.spawn_droplet(0.0, config.tip_y);
        let report = sim.tick(10.0, &mut st, &mut rng);
        assert_eq!(report.arrivals.len(), 1);
        assert_eq!(st.total_drops_delivered(), 1);
        for _ in 0..10 {
            sim.tick(10.0, &mut st, &mut rng);
        }
        assert_eq!(st.total_drops_delivered(), 1);
    }

    #[test]
    fn closed_valve_never_spawns() {
        let (mut sim, mut st, mut rng) = setup(SimulationConfig::default());
        sim.set_flow_rate(10.0).unwrap();
        for _ in 0..500 {
            let r = sim.tick(1.0 / 60.0, &mut st, &mut rng);
            assert!(!r.spawned);
        }
        assert_eq!(sim.in_flight(), 0);
        assert_eq!(st.total_drops_delivered(), 0);
    }

    #[test]
    fn full_flow_spawns_every_tick() {
        let (mut sim, mut st, mut rng) = setup(SimulationConfig::default());
        sim.set_flow_rate(10.0).unwrap();
        st.toggle_valve();
        for _ in 0..30 {
            assert!(sim.tick(1.0 / 60.0, &mut st, &mut rng).spawned);
        }
    }

    #[test]
    fn closing_valve_lets_in_flight_drops_land() {
        let (mut sim, mut st, mut rng) = setup(SimulationConfig::default());
        sim.set_flow_rate(10.0).unwrap();
        st.toggle_valve();
        let mut spawned = 0;
        for _ in 0..20 {
            if sim.tick(1.0 / 60.0, &mut st, &mut rng).spawned {
                spawned += 1;
            }
        }
        st.toggle_valve();
        assert!(sim.in_flight() > 0);
        for _ in 0..600 {
            sim.tick(1.0 / 60.0, &mut st, &mut rng);
        }
        assert_eq!(sim.in_flight(), 0);
        assert_eq!(st.total_drops_delivered(), spawned);
    }

    #[test]
    fn later_drops_see_the_raised_surface() {
        let config = SimulationConfig {
            level_increment: 0.5,
            max_level: 1.5,
            ..SimulationConfig::default()
        };
        let (mut sim, mut st, mut rng) = setup(config);
        let surface = st.surface_y();
        sim.spawn_droplet(0.0, surface + 0.0001);
        sim.spawn_droplet(0.0, surface + 0.4);
        let report = sim.tick(0.01, &mut st, &mut rng);
        assert_eq!(report.arrivals.len(), 2);
        assert_eq!(st.total_drops_delivered(), 2);
    }

    #[test]
    fn splash_particles_expire() {
        let config = SimulationConfig::default();
        let (mut sim, mut st, mut rng) = setup(config);
        sim.spawn_droplet(0.0, st.surface_y() + 0.001);
        sim.tick(0.05, &mut st, &mut rng);
        assert_eq!(sim.particles().len(), config.splash_count);
        assert!(sim.particles().iter().all(|p| p.vy > 0.0));
        let mut elapsed = 0.0;
        while elapsed <= config.particle_life {
            sim.tick(0.05, &mut st, &mut rng);
            elapsed += 0.05;
        }
        assert!(sim.particles().is_empty());
    }

    #[test]
    fn never_overfills_the_burette() {
        let config = SimulationConfig {
            burette_capacity_ml: 0.25,
            ..SimulationConfig::default()
        };
        let (mut sim, mut st, mut rng) = setup(config);
        sim.set_flow_rate(10.0).unwrap();
        st.toggle_valve();
        for _ in 0..2000 {
            sim.tick(1.0 / 60.0, &mut st, &mut rng);
            assert!(st.total_drops_delivered() + sim.in_flight() as u64 <= 5);
        }
        assert_eq!(st.total_drops_delivered(), 5);
        assert!(st.is_finished());
        assert!(!st.valve_open());
    }

    #[test]
    fn invalid_flow_keeps_previous_rate() {
        let (mut sim, _, _) = setup(SimulationConfig::default());
        let before = sim.drop_rate();
        assert!(sim.set_flow_rate(42.0).is_err());
        assert_eq!(sim.drop_rate(), before);
        assert_eq!(sim.flow_rate(), 5.0);
    }

    #[test]
    fn adjust_flow_clamps() {
        let (mut sim, _, _) = setup(SimulationConfig::default());
        assert_eq!(sim.adjust_flow(100.0), 10.0);
        assert_eq!(sim.adjust_flow(-100.0), 1.0);
    }

    #[test]
    fn crossing_offset_edge_cases() {
        assert_eq!(crossing_offset(-1.0, 0.0, -2.5, 0.1), 0.0);
        let s = crossing_offset(0.5, -1.0, -2.0, 10.0);
        // 0.5 = s + s^2  ->  s = (-1 + sqrt(3)) / 2
        assert!((s - (3f64.sqrt() - 1.0) / 2.0).abs() < 1e-12);
    }
}
