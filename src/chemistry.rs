//! pH models for a base-into-acid titration.
//!
//! Two strategies live behind [`PhModel`]:
//!
//! - [`EquilibriumModel`]: branch per [`ReactionType`], intro-chemistry
//!   approximations (excess strong acid/base, Henderson–Hasselbalch buffer,
//!   salt hydrolysis at the equivalence point).
//! - [`LogisticModel`]: a single sigmoid centred on the equivalence volume,
//!   independent of reaction type.
//!
//! Both are pure: identical inputs always give identical output.

use crate::error::{require_positive, Result, TitrationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// -- Equilibrium constants --

/// Weak acid dissociation constant (acetic-acid-like).
pub const KA: f64 = 1.8e-5;

/// Weak base dissociation constant (ammonia-like).
pub const KB: f64 = 1.8e-5;

/// Ion product of water at 25 °C.
pub const KW: f64 = 1e-14;

// -- Numerical safeguards --

/// Floor applied to every logarithm argument.
pub const EPS: f64 = 1e-12;

/// Absolute mole difference under which acid and base count as equivalent.
pub const EQUIVALENCE_TOLERANCE_MOL: f64 = 1e-6;

/// pH of pure water, and of a strong/strong mixture at equivalence.
pub const NEUTRAL_PH: f64 = 7.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionType {
    StrongAcidStrongBase,
    WeakAcidStrongBase,
    StrongAcidWeakBase,
    WeakAcidWeakBase,
}

impl ReactionType {
    pub const ALL: [ReactionType; 4] = [
        ReactionType::StrongAcidStrongBase,
        ReactionType::WeakAcidStrongBase,
        ReactionType::StrongAcidWeakBase,
        ReactionType::WeakAcidWeakBase,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ReactionType::StrongAcidStrongBase => "Strong acid + strong base",
            ReactionType::WeakAcidStrongBase => "Weak acid + strong base",
            ReactionType::StrongAcidWeakBase => "Strong acid + weak base",
            ReactionType::WeakAcidWeakBase => "Weak acid + weak base",
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            ReactionType::StrongAcidStrongBase => "strong-strong",
            ReactionType::WeakAcidStrongBase => "weak-strong",
            ReactionType::StrongAcidWeakBase => "strong-weak",
            ReactionType::WeakAcidWeakBase => "weak-weak",
        }
    }
}

impl fmt::Display for ReactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for ReactionType {
    type Err = TitrationError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase().replace('_', "-");
        match key.as_str() {
            "strong-strong" | "strong-acid-strong-base" => Ok(ReactionType::StrongAcidStrongBase),
            "weak-strong" | "weak-acid-strong-base" => Ok(ReactionType::WeakAcidStrongBase),
            "strong-weak" | "strong-acid-weak-base" => Ok(ReactionType::StrongAcidWeakBase),
            "weak-weak" | "weak-acid-weak-base" => Ok(ReactionType::WeakAcidWeakBase),
            _ => Err(TitrationError::invalid(
                "reaction_type",
                format!("unknown reaction type {s:?}"),
            )),
        }
    }
}

/// Analyte and titrant description for one experiment run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExperimentParameters {
    /// Acid concentration in the flask [mol/L].
    pub acid_molarity: f64,
    /// Base concentration in the burette [mol/L].
    pub base_molarity: f64,
    /// Initial acid volume in the flask [mL].
    pub acid_volume_ml: f64,
}

impl Default for ExperimentParameters {
    fn default() -> Self {
        Self {
            acid_molarity: 0.1,
            base_molarity: 0.1,
            acid_volume_ml: 50.0,
        }
    }
}

impl ExperimentParameters {
    /// Validated constructor.
    pub fn new(acid_molarity: f64, base_molarity: f64, acid_volume_ml: f64) -> Result<Self> {
        let p = Self {
            acid_molarity,
            base_molarity,
            acid_volume_ml,
        };
        p.validate()?;
        Ok(p)
    }

    pub fn validate(&self) -> Result<()> {
        require_positive("acid_molarity", self.acid_molarity)?;
        require_positive("base_molarity", self.base_molarity)?;
        require_positive("acid_volume_ml", self.acid_volume_ml)?;
        Ok(())
    }

    /// Base volume [mL] that neutralises all the acid.
    pub fn equivalence_volume_ml(&self) -> f64 {
        self.acid_molarity * self.acid_volume_ml / self.base_molarity
    }

    pub fn acid_moles(&self) -> f64 {
        self.acid_molarity * self.acid_volume_ml / 1000.0
    }

    pub fn base_moles(&self, added_base_ml: f64) -> f64 {
        self.base_molarity * added_base_ml / 1000.0
    }

    /// Combined flask volume [L] after `added_base_ml` of titrant.
    pub fn total_volume_l(&self, added_base_ml: f64) -> f64 {
        (self.acid_volume_ml + added_base_ml) / 1000.0
    }
}

/// Maps titration progress to pH.
pub trait PhModel {
    fn ph(&self, reaction: ReactionType, params: &ExperimentParameters, added_base_ml: f64) -> f64;
}

/// `-log10(x)` with the argument floored at [`EPS`].
#[inline]
fn p_value(x: f64) -> f64 {
    -x.max(EPS).log10()
}

/// Reaction-type specific equilibrium approximations.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EquilibriumModel {
    pub ka: f64,
    pub kb: f64,
}

impl Default for EquilibriumModel {
    fn default() -> Self {
        Self { ka: KA, kb: KB }
    }
}

impl EquilibriumModel {
    fn strong_acid_strong_base(acid: f64, base: f64, volume_l: f64) -> f64 {
        let excess = base - acid;
        if excess.abs() < EQUIVALENCE_TOLERANCE_MOL {
            NEUTRAL_PH
        } else if excess < 0.0 {
            p_value(-excess / volume_l)
        } else {
            14.0 - p_value(excess / volume_l)
        }
    }

    fn weak_acid_strong_base(&self, params: &ExperimentParameters, acid: f64, base: f64, volume_l: f64) -> f64 {
        let excess = base - acid;
        if excess.abs() < EQUIVALENCE_TOLERANCE_MOL {
            // Conjugate base hydrolysis. Kept as 14 + log10([OH-]).
            let kb_eff = KW / self.ka;
            let oh = (kb_eff * acid / volume_l).sqrt();
            14.0 + oh.max(EPS).log10()
        } else if excess < 0.0 {
            if base < EPS {
                p_value((self.ka * params.acid_molarity).sqrt())
            } else {
                // Henderson-Hasselbalch as-is: dips below the initial pH for tiny base amounts.
                p_value(self.ka) + (base / (acid - base)).log10()
            }
        } else {
            14.0 - p_value(excess / volume_l)
        }
    }

    fn strong_acid_weak_base(&self, acid: f64, base: f64, volume_l: f64) -> f64 {
        let excess = base - acid;
        if excess.abs() < EQUIVALENCE_TOLERANCE_MOL {
            let ka_eff = KW / self.kb;
            let h = (ka_eff * acid / volume_l).sqrt();
            p_value(h)
        } else if excess < 0.0 {
            p_value(-excess / volume_l)
        } else {
            let oh = (self.kb * excess / volume_l).sqrt();
            14.0 - p_value(oh)
        }
    }

    /// Coarse classification only; no volume dependence.
    fn weak_acid_weak_base(&self) -> f64 {
        if (self.ka - self.kb).abs() < EPS {
            NEUTRAL_PH
        } else if self.ka > self.kb {
            6.0
        } else {
            8.0
        }
    }
}

impl PhModel for EquilibriumModel {
    fn ph(&self, reaction: ReactionType, params: &ExperimentParameters, added_base_ml: f64) -> f64 {
        let acid = params.acid_moles();
        let base = params.base_moles(added_base_ml);
        let volume_l = params.total_volume_l(added_base_ml);

        match reaction {
            ReactionType::StrongAcidStrongBase => Self::strong_acid_strong_base(acid, base, volume_l),
            ReactionType::WeakAcidStrongBase => self.weak_acid_strong_base(params, acid, base, volume_l),
            ReactionType::StrongAcidWeakBase => self.strong_acid_weak_base(acid, base, volume_l),
            ReactionType::WeakAcidWeakBase => self.weak_acid_weak_base(),
        }
    }
}

/// Sigmoid stand-in for the titration curve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticModel {
    pub ph_start: f64,
    pub ph_range: f64,
    /// Inverse width of the transition [1/mL].
    pub steepness: f64,
}

impl Default for LogisticModel {
    fn default() -> Self {
        Self {
            ph_start: 1.0,
            ph_range: 13.0,
            steepness: 1.8,
        }
    }
}

impl PhModel for LogisticModel {
    fn ph(&self, _reaction: ReactionType, params: &ExperimentParameters, added_base_ml: f64) -> f64 {
        let x = (added_base_ml - params.equivalence_volume_ml()) * self.steepness;
        self.ph_start + self.ph_range / (1.0 + (-x).exp())
    }
}

/// Selectable pH strategy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChemistryModel {
    Equilibrium(EquilibriumModel),
    Logistic(LogisticModel),
}

impl Default for ChemistryModel {
    fn default() -> Self {
        ChemistryModel::Equilibrium(EquilibriumModel::default())
    }
}

impl ChemistryModel {
    pub fn name(&self) -> &'static str {
        match self {
            ChemistryModel::Equilibrium(_) => "equilibrium",
            ChemistryModel::Logistic(_) => "logistic",
        }
    }

    /// The other strategy, with default tuning.
    pub fn toggled(&self) -> Self {
        match self {
            ChemistryModel::Equilibrium(_) => ChemistryModel::Logistic(LogisticModel::default()),
            ChemistryModel::Logistic(_) => ChemistryModel::Equilibrium(EquilibriumModel::default()),
        }
    }
}

impl PhModel for ChemistryModel {
    fn ph(&self, reaction: ReactionType, params: &ExperimentParameters, added_base_ml: f64) -> f64 {
        match self {
            ChemistryModel::Equilibrium(m) => m.ph(reaction, params, added_base_ml),
            ChemistryModel::Logistic(m) => m.ph(reaction, params, added_base_ml),
        }
    }
}

impl FromStr for ChemistryModel {
    type Err = TitrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "equilibrium" => Ok(ChemistryModel::Equilibrium(EquilibriumModel::default())),
            "logistic" | "sigmoid" => Ok(ChemistryModel::Logistic(LogisticModel::default())),
            _ => Err(TitrationError::invalid(
                "model",
                format!("unknown chemistry model {s:?}"),
            )),
        }
    }
}
