//! Accumulated titration progress and its derived pH.

use crate::chemistry::{
    ChemistryModel, ExperimentParameters, PhModel, ReactionType, EQUIVALENCE_TOLERANCE_MOL,
};
use crate::config::SimulationConfig;
use crate::error::Result;
use crate::indicator::{solution_color, SolutionColor, Stage};
use log::{debug, info};
use serde::Serialize;
use std::fmt;

/// One point of the titration curve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Sample {
    pub volume_ml: f64,
    pub ph: f64,
}

/// Receives titration progress as it happens (the chart, a CSV writer, ...).
pub trait TitrationObserver {
    fn on_sample(&mut self, sample: &Sample);

    /// Called once per run, with the first sample at or past equivalence.
    fn on_equivalence(&mut self, _sample: &Sample) {}

    fn on_reset(&mut self) {}
}

pub struct TitrationState {
    config: SimulationConfig,
    parameters: ExperimentParameters,
    reaction: ReactionType,
    model: ChemistryModel,

    total_drops: u64,
    volume_ml: f64,
    liquid_level: f64,
    ph: f64,
    indicator_active: bool,
    valve_open: bool,
    finished: bool,

    history: Vec<Sample>,
    equivalence: Option<Sample>,
    observers: Vec<Box<dyn TitrationObserver>>,
}

impl TitrationState {
    pub fn new(
        config: SimulationConfig,
        parameters: ExperimentParameters,
        reaction: ReactionType,
        model: ChemistryModel,
    ) -> Result<Self> {
        config.validate()?;
        parameters.validate()?;
        let mut st = Self {
            config,
            parameters,
            reaction,
            model,
            total_drops: 0,
            volume_ml: 0.0,
            liquid_level: config.min_level,
            ph: 0.0,
            indicator_active: true,
            valve_open: false,
            finished: false,
            history: Vec::new(),
            equivalence: None,
            observers: Vec::new(),
        };
        st.ph = st.starting_ph();
        Ok(st)
    }

    pub fn subscribe(&mut self, observer: Box<dyn TitrationObserver>) {
        self.observers.push(observer);
    }

    /// Registers one arrived drop and returns the new chart sample.
    pub fn apply_drop(&mut self) -> Sample {
        self.total_drops += 1;
        self.volume_ml = self.volume_for_drops(self.total_drops);
        self.liquid_level = self.level_for_drops(self.total_drops);
        self.ph = self.ph_for_volume(self.volume_ml);

        let sample = Sample {
            volume_ml: self.volume_ml,
            ph: self.ph,
        };
        self.history.push(sample);
        debug!(
            "drop {} -> {:.3} mL, pH {:.3}",
            self.total_drops, sample.volume_ml, sample.ph
        );
        for o in self.observers.iter_mut() {
            o.on_sample(&sample);
        }

        if self.equivalence.is_none() && self.past_equivalence() {
            self.equivalence = Some(sample);
            info!(
                "equivalence reached at {:.2} mL (pH {:.2})",
                sample.volume_ml, sample.ph
            );
            for o in self.observers.iter_mut() {
                o.on_equivalence(&sample);
            }
        }

        if !self.finished && self.total_drops >= self.max_drops() {
            self.finished = true;
            self.valve_open = false;
            info!("burette empty after {:.2} mL, valve closed", self.volume_ml);
        }

        sample
    }

    pub fn set_parameters(
        &mut self,
        acid_molarity: f64,
        base_molarity: f64,
        acid_volume_ml: f64,
    ) -> Result<()> {
        let p = ExperimentParameters::new(acid_molarity, base_molarity, acid_volume_ml)?;
        self.parameters = p;
        info!(
            "parameters: acid {} M x {} mL, base {} M (equivalence at {:.2} mL)",
            p.acid_molarity,
            p.acid_volume_ml,
            p.base_molarity,
            p.equivalence_volume_ml()
        );
        self.reset();
        Ok(())
    }

    pub fn set_reaction_type(&mut self, reaction: ReactionType) {
        self.reaction = reaction;
        info!("reaction type: {}", reaction.label());
        self.reset();
    }

    /// Parses `name` first; an unknown name leaves the state untouched.
    pub fn set_reaction_type_named(&mut self, name: &str) -> Result<()> {
        let reaction = name.parse::<ReactionType>()?;
        self.set_reaction_type(reaction);
        Ok(())
    }

    pub fn set_model(&mut self, model: ChemistryModel) {
        self.model = model;
        info!("chemistry model: {}", model.name());
        self.reset();
    }

    /// Back to an untouched flask. The indicator choice survives.
    pub fn reset(&mut self) {
        self.total_drops = 0;
        self.volume_ml = 0.0;
        self.liquid_level = self.config.min_level;
        self.ph = self.starting_ph();
        self.valve_open = false;
        self.finished = false;
        self.history.clear();
        self.equivalence = None;
        debug!("titration reset (pH {:.3})", self.ph);
        for o in self.observers.iter_mut() {
            o.on_reset();
        }
    }

    pub fn toggle_valve(&mut self) {
        self.valve_open = !self.valve_open;
    }

    pub fn set_valve(&mut self, open: bool) {
        self.valve_open = open;
    }

    pub fn toggle_indicator(&mut self) {
        self.indicator_active = !self.indicator_active;
    }

    pub fn set_indicator(&mut self, active: bool) {
        self.indicator_active = active;
    }

    pub fn solution_color(&self) -> SolutionColor {
        solution_color(self.ph, self.indicator_active)
    }

    pub fn stage(&self) -> Stage {
        Stage::classify(self.ph)
    }

    /// pH recomputed from scratch for an arbitrary added volume.
    pub fn ph_for_volume(&self, volume_ml: f64) -> f64 {
        self.model.ph(self.reaction, &self.parameters, volume_ml)
    }

    pub fn starting_ph(&self) -> f64 {
        self.ph_for_volume(0.0)
    }

    fn volume_for_drops(&self, drops: u64) -> f64 {
        drops as f64 * self.config.ml_per_drop
    }

    fn level_for_drops(&self, drops: u64) -> f64 {
        let c = &self.config;
        (c.min_level + drops as f64 * c.level_increment).min(c.max_level)
    }

    fn past_equivalence(&self) -> bool {
        let acid = self.parameters.acid_moles();
        let base = self.parameters.base_moles(self.volume_ml);
        base > acid - EQUIVALENCE_TOLERANCE_MOL
    }

    /// Number of drops the burette holds.
    pub fn max_drops(&self) -> u64 {
        (self.config.burette_capacity_ml / self.config.ml_per_drop + 1e-9).floor() as u64
    }

    pub fn burette_remaining_ml(&self) -> f64 {
        (self.config.burette_capacity_ml - self.volume_ml).max(0.0)
    }

    /// Height of the liquid surface in scene coordinates.
    pub fn surface_y(&self) -> f64 {
        self.config.flask_bottom_y + self.liquid_level
    }

    pub fn total_drops_delivered(&self) -> u64 {
        self.total_drops
    }

    pub fn volume_ml(&self) -> f64 {
        self.volume_ml
    }

    pub fn liquid_level(&self) -> f64 {
        self.liquid_level
    }

    pub fn ph(&self) -> f64 {
        self.ph
    }

    pub fn indicator_active(&self) -> bool {
        self.indicator_active
    }

    pub fn valve_open(&self) -> bool {
        self.valve_open
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn history(&self) -> &[Sample] {
        &self.history
    }

    pub fn equivalence_sample(&self) -> Option<Sample> {
        self.equivalence
    }

    pub fn equivalence_volume_ml(&self) -> f64 {
        self.parameters.equivalence_volume_ml()
    }

    pub fn parameters(&self) -> &ExperimentParameters {
        &self.parameters
    }

    pub fn reaction(&self) -> ReactionType {
        self.reaction
    }

    pub fn model(&self) -> &ChemistryModel {
        &self.model
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }
}

impl fmt::Debug for TitrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TitrationState")
            .field("reaction", &self.reaction)
            .field("model", &self.model.name())
            .field("parameters", &self.parameters)
            .field("total_drops", &self.total_drops)
            .field("volume_ml", &self.volume_ml)
            .field("liquid_level", &self.liquid_level)
            .field("ph", &self.ph)
            .field("valve_open", &self.valve_open)
            .field("indicator_active", &self.indicator_active)
            .field("finished", &self.finished)
            .field("samples", &self.history.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chemistry::LogisticModel;
    use crate::error::TitrationError;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn assert_approx(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() < tol,
            "expected {expected} ± {tol}, got {actual}"
        );
    }

    fn fresh() -> TitrationState {
        TitrationState::new(
            SimulationConfig::default(),
            ExperimentParameters::default(),
            ReactionType::StrongAcidStrongBase,
            ChemistryModel::default(),
        )
        .unwrap()
    }

    #[derive(Default)]
    struct Log {
        samples: Vec<Sample>,
        equivalences: Vec<Sample>,
        resets: usize,
    }

    struct Recorder(Rc<RefCell<Log>>);

    impl TitrationObserver for Recorder {
        fn on_sample(&mut self, sample: &Sample) {
            self.0.borrow_mut().samples.push(*sample);
        }
        fn on_equivalence(&mut self, sample: &Sample) {
            self.0.borrow_mut().equivalences.push(*sample);
        }
        fn on_reset(&mut self) {
            self.0.borrow_mut().resets += 1;
        }
    }

    #[test]
    fn initial_state() {
        let st = fresh();
        assert_eq!(st.total_drops_delivered(), 0);
        assert_eq!(st.volume_ml(), 0.0);
        assert_eq!(st.liquid_level(), 0.2);
        assert_approx(st.ph(), 1.0, 1e-9);
        assert!(!st.valve_open());
        assert!(st.history().is_empty());
    }

    #[test]
    fn apply_drop_advances_volume_and_level() {
        let mut st = fresh();
        let s = st.apply_drop();
        assert_eq!(st.total_drops_delivered(), 1);
        assert_approx(s.volume_ml, 0.05, 1e-12);
        assert_approx(st.liquid_level(), 0.2006, 1e-12);
        assert_eq!(st.history(), &[s]);
        assert!(s.ph > 1.0);
    }

    #[test]
    fn liquid_level_clamps_at_max() {
        let mut st = fresh();
        for _ in 0..1500 {
            st.apply_drop();
        }
        assert_eq!(st.liquid_level(), 0.8);
    }

    #[test]
    fn ph_matches_recomputation_from_scratch() {
        let mut st = fresh();
        for _ in 0..1200 {
            let s = st.apply_drop();
            assert_eq!(s.ph, st.ph_for_volume(st.volume_ml()));
        }
    }

    #[test]
    fn full_run_to_equivalence_and_beyond() {
        let mut st = fresh();
        while st.total_drops_delivered() < 1000 {
            st.apply_drop();
        }
        assert_approx(st.volume_ml(), 50.0, 1e-9);
        assert_eq!(st.ph(), 7.0);
        assert_eq!(st.stage(), Stage::NearEquivalence);
        let eq = st.equivalence_sample().expect("equivalence detected");
        assert_approx(eq.volume_ml, 50.0, 1e-9);

        while st.volume_ml() < 100.0 - 1e-9 {
            st.apply_drop();
        }
        assert!(st.ph() > 12.0);
        assert_eq!(st.stage(), Stage::Basic);
    }

    #[test]
    fn indicator_turns_pink_after_equivalence() {
        let mut st = fresh();
        assert!(st.solution_color().is_colorless());
        for _ in 0..1100 {
            st.apply_drop();
        }
        assert!(!st.solution_color().is_colorless());
        st.toggle_indicator();
        assert!(st.solution_color().is_colorless());
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut st = fresh();
        st.toggle_valve();
        for _ in 0..321 {
            st.apply_drop();
        }
        st.reset();
        assert_eq!(st.total_drops_delivered(), 0);
        assert_eq!(st.volume_ml(), 0.0);
        assert_eq!(st.liquid_level(), 0.2);
        assert_approx(st.ph(), 1.0, 1e-9);
        assert!(!st.valve_open());
        assert!(st.history().is_empty());
        assert!(st.equivalence_sample().is_none());
    }

    #[test]
    fn set_parameters_validates_and_resets() {
        let mut st = fresh();
        st.apply_drop();
        st.set_parameters(0.1, 0.2, 40.0).unwrap();
        assert_eq!(st.total_drops_delivered(), 0);
        assert_approx(st.equivalence_volume_ml(), 20.0, 1e-12);
    }

    #[test]
    fn invalid_parameters_leave_state_unchanged() {
        let mut st = fresh();
        for _ in 0..10 {
            st.apply_drop();
        }
        let before = (st.total_drops_delivered(), st.ph(), *st.parameters());
        let err = st.set_parameters(0.1, 0.0, 50.0).unwrap_err();
        assert!(matches!(err, TitrationError::InvalidParameter { .. }));
        assert_eq!(before, (st.total_drops_delivered(), st.ph(), *st.parameters()));
        assert_eq!(st.history().len(), 10);
    }

    #[test]
    fn unknown_reaction_name_is_rejected() {
        let mut st = fresh();
        st.apply_drop();
        assert!(st.set_reaction_type_named("triprotic").is_err());
        assert_eq!(st.total_drops_delivered(), 1);
        st.set_reaction_type_named("weak-strong").unwrap();
        assert_eq!(st.reaction(), ReactionType::WeakAcidStrongBase);
        assert_eq!(st.total_drops_delivered(), 0);
        assert_approx(st.ph(), 2.872, 1e-3);
    }

    #[test]
    fn switching_model_resets_to_its_starting_ph() {
        let mut st = fresh();
        st.apply_drop();
        st.set_model(ChemistryModel::Logistic(LogisticModel::default()));
        assert_eq!(st.total_drops_delivered(), 0);
        assert_approx(st.ph(), 1.0, 1e-9);
        for _ in 0..1000 {
            st.apply_drop();
        }
        assert_approx(st.ph(), 7.5, 1e-9);
    }

    #[test]
    fn observers_see_samples_equivalence_and_resets() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut st = fresh();
        st.subscribe(Box::new(Recorder(log.clone())));
        for _ in 0..1010 {
            st.apply_drop();
        }
        {
            let l = log.borrow();
            assert_eq!(l.samples.len(), 1010);
            assert_eq!(l.samples.as_slice(), st.history());
            assert_eq!(l.equivalences.len(), 1);
            assert_approx(l.equivalences[0].volume_ml, 50.0, 1e-9);
        }
        st.reset();
        st.apply_drop();
        let l = log.borrow();
        assert_eq!(l.resets, 1);
        assert_eq!(l.samples.len(), 1011);
    }

    #[test]
    fn burette_capacity_closes_the_valve() {
        let config = SimulationConfig {
            burette_capacity_ml: 1.0,
            ..SimulationConfig::default()
        };
        let mut st = TitrationState::new(
            config,
            ExperimentParameters::default(),
            ReactionType::StrongAcidStrongBase,
            ChemistryModel::default(),
        )
        .unwrap();
        assert_eq!(st.max_drops(), 20);
        st.toggle_valve();
        for _ in 0..19 {
            st.apply_drop();
        }
        assert!(st.valve_open());
        st.apply_drop();
        assert!(!st.valve_open());
        assert!(st.is_finished());
        assert_eq!(st.burette_remaining_ml(), 0.0);
    }

    #[test]
    fn surface_rises_with_level() {
        let mut st = fresh();
        let y0 = st.surface_y();
        st.apply_drop();
        assert!(st.surface_y() > y0);
        assert_approx(y0, -0.3, 1e-12);
    }
}
