use crate::chemistry::{ChemistryModel, ExperimentParameters, ReactionType};
use crate::error::{require_positive, Result, TitrationError};
use serde::{Deserialize, Serialize};

/// Fixed tuning for one experiment: drop size, flask geometry, gravity, flow.
///
/// Lengths are scene units (flask bottom around -0.5, burette tip around 1.35),
/// times are seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub ml_per_drop: f64,
    pub level_increment: f64,
    pub min_level: f64,
    pub max_level: f64,
    /// Vertical acceleration of a falling drop; must be negative.
    pub gravity: f64,
    pub tip_x: f64,
    pub tip_y: f64,
    pub tip_jitter: f64,
    pub flask_bottom_y: f64,
    pub flow_min: f64,
    pub flow_max: f64,
    pub default_flow: f64,
    /// Spawn probability per tick at `flow_min`.
    pub min_drop_rate: f64,
    /// Spawn probability per tick at `flow_max`.
    pub max_drop_rate: f64,
    pub splash_count: usize,
    pub splash_speed: f64,
    pub particle_life: f64,
    pub burette_capacity_ml: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            ml_per_drop: 0.05,
            level_increment: 0.0006,
            min_level: 0.2,
            max_level: 0.8,
            gravity: -2.5,
            tip_x: 0.0,
            tip_y: 1.35,
            tip_jitter: 0.01,
            flask_bottom_y: -0.5,
            flow_min: 1.0,
            flow_max: 10.0,
            default_flow: 5.0,
            min_drop_rate: 0.05,
            max_drop_rate: 1.0,
            splash_count: 6,
            splash_speed: 0.6,
            particle_life: 0.4,
            burette_capacity_ml: 100.0,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        require_positive("ml_per_drop", self.ml_per_drop)?;
        require_positive("burette_capacity_ml", self.burette_capacity_ml)?;
        require_positive("particle_life", self.particle_life)?;
        if self.burette_capacity_ml < self.ml_per_drop {
            return Err(TitrationError::invalid(
                "burette_capacity_ml",
                format!(
                    "{} mL holds no whole {} mL drop",
                    self.burette_capacity_ml, self.ml_per_drop
                ),
            ));
        }
        if !(self.level_increment >= 0.0) {
            return Err(TitrationError::invalid("level_increment", "must be >= 0"));
        }
        if !(self.min_level <= self.max_level) {
            return Err(TitrationError::invalid(
                "min_level",
                format!("{} exceeds max_level {}", self.min_level, self.max_level),
            ));
        }
        if !(self.gravity.is_finite() && self.gravity < 0.0) {
            return Err(TitrationError::invalid(
                "gravity",
                format!("{} must be a finite negative acceleration", self.gravity),
            ));
        }
        if !(self.flow_min < self.flow_max) {
            return Err(TitrationError::invalid("flow_min", "must be below flow_max"));
        }
        if !(self.flow_min..=self.flow_max).contains(&self.default_flow) {
            return Err(TitrationError::invalid(
                "default_flow",
                format!("{} outside {}..={}", self.default_flow, self.flow_min, self.flow_max),
            ));
        }
        let unit = 0.0..=1.0;
        if !unit.contains(&self.min_drop_rate)
            || !unit.contains(&self.max_drop_rate)
            || self.min_drop_rate > self.max_drop_rate
        {
            return Err(TitrationError::invalid(
                "drop_rate",
                "min/max drop rate must be probabilities with min <= max",
            ));
        }
        if self.max_drop_rate <= 0.0 {
            return Err(TitrationError::invalid("max_drop_rate", "must be > 0"));
        }
        Ok(())
    }

    /// Linear map from a flow setting to a per-tick spawn probability.
    pub fn drop_rate_for_flow(&self, flow: f64) -> Result<f64> {
        if !(self.flow_min..=self.flow_max).contains(&flow) {
            return Err(TitrationError::invalid(
                "flow_rate",
                format!("{flow} outside {}..={}", self.flow_min, self.flow_max),
            ));
        }
        let t = (flow - self.flow_min) / (self.flow_max - self.flow_min);
        Ok(self.min_drop_rate + t * (self.max_drop_rate - self.min_drop_rate))
    }
}

/// Everything needed to build an [`Experiment`](crate::Experiment).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub fps_cap: u32,
    pub enable_color: bool,
    pub seed: u64,
    pub parameters: ExperimentParameters,
    pub reaction: ReactionType,
    pub model: ChemistryModel,
    pub indicator_active: bool,
    pub simulation: SimulationConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fps_cap: 60,
            enable_color: true,
            seed: 0x7174_A7E5_u64,
            parameters: ExperimentParameters::default(),
            reaction: ReactionType::StrongAcidStrongBase,
            model: ChemistryModel::default(),
            indicator_active: true,
            simulation: SimulationConfig::default(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.parameters.validate()?;
        self.simulation.validate()?;
        if self.fps_cap == 0 {
            return Err(TitrationError::invalid("fps_cap", "must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn flow_maps_linearly_onto_drop_rate() {
        let c = SimulationConfig::default();
        assert!((c.drop_rate_for_flow(1.0).unwrap() - 0.05).abs() < 1e-12);
        assert!((c.drop_rate_for_flow(10.0).unwrap() - 1.0).abs() < 1e-12);
        let mid = c.drop_rate_for_flow(5.5).unwrap();
        assert!((mid - 0.525).abs() < 1e-12, "{mid}");
    }

    #[test]
    fn flow_outside_range_is_rejected() {
        let c = SimulationConfig::default();
        assert!(c.drop_rate_for_flow(0.5).is_err());
        assert!(c.drop_rate_for_flow(10.5).is_err());
        assert!(c.drop_rate_for_flow(f64::NAN).is_err());
    }

    #[test]
    fn upward_gravity_is_rejected() {
        let c = SimulationConfig {
            gravity: 1.0,
            ..SimulationConfig::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn inverted_level_bounds_are_rejected() {
        let c = SimulationConfig {
            min_level: 0.9,
            ..SimulationConfig::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn burette_smaller_than_one_drop_is_rejected() {
        let c = SimulationConfig {
            burette_capacity_ml: 0.01,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            c.validate(),
            Err(TitrationError::InvalidParameter { name: "burette_capacity_ml", .. })
        ));

        let one_drop = SimulationConfig {
            burette_capacity_ml: 0.05,
            ..SimulationConfig::default()
        };
        assert!(one_drop.validate().is_ok());
    }

    #[test]
    fn zero_drop_rate_is_rejected() {
        let c = SimulationConfig {
            min_drop_rate: 0.0,
            max_drop_rate: 0.0,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            c.validate(),
            Err(TitrationError::InvalidParameter { name: "max_drop_rate", .. })
        ));

        let closed_at_min = SimulationConfig {
            min_drop_rate: 0.0,
            ..SimulationConfig::default()
        };
        assert!(closed_at_min.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: Settings = serde_json::from_str(
            r#"{ "reaction": "weak_acid_strong_base", "parameters": { "acid_molarity": 0.2, "base_molarity": 0.1, "acid_volume_ml": 25.0 }, "simulation": { "ml_per_drop": 0.1 } }"#,
        )
        .unwrap();
        assert_eq!(s.reaction, ReactionType::WeakAcidStrongBase);
        assert!((s.parameters.equivalence_volume_ml() - 50.0).abs() < 1e-9);
        assert_eq!(s.simulation.ml_per_drop, 0.1);
        assert_eq!(s.simulation.max_level, 0.8);
        assert_eq!(s.fps_cap, 60);
    }

    #[test]
    fn invalid_parameters_fail_validation() {
        let s = Settings {
            parameters: ExperimentParameters {
                base_molarity: 0.0,
                ..ExperimentParameters::default()
            },
            ..Settings::default()
        };
        assert!(matches!(
            s.validate(),
            Err(TitrationError::InvalidParameter { name: "base_molarity", .. })
        ));
    }
}
