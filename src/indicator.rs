//! Derived observations: phenolphthalein colour and titration stage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// pH at which phenolphthalein starts turning pink.
pub const INDICATOR_THRESHOLD_PH: f64 = 8.2;

/// pH span over which the pink reaches full intensity.
pub const INDICATOR_RAMP_PH: f64 = 3.0;

const PINK_GREEN_DROP: f32 = 0.6;
const PINK_BLUE_DROP: f32 = 0.3;

/// Linear RGB in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolutionColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl SolutionColor {
    pub const COLORLESS: SolutionColor = SolutionColor {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub fn is_colorless(&self) -> bool {
        *self == Self::COLORLESS
    }

    pub fn to_rgb8(self) -> (u8, u8, u8) {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
        (q(self.r), q(self.g), q(self.b))
    }
}

/// Pink intensity in `[0, 1]` for a given pH.
pub fn indicator_intensity(ph: f64) -> f64 {
    if ph < INDICATOR_THRESHOLD_PH {
        return 0.0;
    }
    ((ph - INDICATOR_THRESHOLD_PH) / INDICATOR_RAMP_PH).min(1.0)
}

pub fn solution_color(ph: f64, indicator_active: bool) -> SolutionColor {
    if !indicator_active || ph < INDICATOR_THRESHOLD_PH {
        return SolutionColor::COLORLESS;
    }
    let i = indicator_intensity(ph) as f32;
    SolutionColor {
        r: 1.0,
        g: 1.0 - PINK_GREEN_DROP * i,
        b: 1.0 - PINK_BLUE_DROP * i,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Acidic,
    NearEquivalence,
    Basic,
}

impl Stage {
    pub fn classify(ph: f64) -> Stage {
        if ph < 6.5 {
            Stage::Acidic
        } else if ph <= 7.5 {
            Stage::NearEquivalence
        } else {
            Stage::Basic
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Acidic => "before equivalence (acidic)",
            Stage::NearEquivalence => "near equivalence",
            Stage::Basic => "after equivalence (basic)",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
