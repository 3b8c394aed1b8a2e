//! Error types for the titration core.

use thiserror::Error;

/// Errors surfaced by the simulation core.
///
/// Numeric singularities (log of a non-positive argument) are never reported
/// here; the chemistry model floors those arguments instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TitrationError {
    /// A command carried a value outside its valid domain. The state is left
    /// untouched when this is returned.
    #[error("invalid {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl TitrationError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        TitrationError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Result type alias for titration operations.
pub type Result<T> = std::result::Result<T, TitrationError>;

/// Rejects NaN, infinities and values `<= 0`.
pub(crate) fn require_positive(name: &'static str, value: f64) -> Result<f64> {
    if !value.is_finite() {
        return Err(TitrationError::invalid(name, format!("{value} is not finite")));
    }
    if value <= 0.0 {
        return Err(TitrationError::invalid(name, format!("{value} must be > 0")));
    }
    Ok(value)
}
