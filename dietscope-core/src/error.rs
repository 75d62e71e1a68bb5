//! Error taxonomy for the emissions model
//!
//! Per-diet and per-neighborhood errors are isolated by the batch runner;
//! calibration errors are fatal for a whole run. Zero-baseline percent deltas
//! are not errors at all (see `delta::DeltaRecord::percent_delta`).

use thiserror::Error;

/// Errors raised by model computations and reference-data validation
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    /// A diet references a food item absent from the factor table.
    #[error("diet '{diet}' references food item '{item}' which has no impact factor")]
    MissingFactor { diet: String, item: String },

    /// Non-positive population or income.
    #[error("neighborhood '{id}' is invalid: {reason}")]
    InvalidNeighborhood { id: String, reason: String },

    /// Calibrated baseline total is outside tolerance of the target, or the
    /// single scale factor would push some fraction above 1.0.
    #[error(
        "calibration against target {target_version} failed: recomputed {recomputed:.3} t \
         vs target {target:.3} t (relative error {relative_error:.6}, tolerance {tolerance}){}",
        exceeded_note(.exceeded)
    )]
    CalibrationConvergence {
        target_version: String,
        target: f64,
        recomputed: f64,
        relative_error: f64,
        tolerance: f64,
        /// Items whose scaled Scope 1+2 fraction would exceed 1.0
        exceeded: Vec<String>,
    },

    /// Impact factor violates range invariants.
    #[error("impact factor for '{item}' is invalid: {reason}")]
    InvalidFactor { item: String, reason: String },

    /// Diet profile violates mass invariants.
    #[error("diet '{diet}' is invalid: {reason}")]
    InvalidDiet { diet: String, reason: String },

    /// Lookup of a diet name that is not loaded.
    #[error("unknown diet '{0}'")]
    UnknownDiet(String),

    /// Override rule cannot be applied to the calibrated table.
    #[error("override for '{item}' cannot be applied: {reason}")]
    InvalidOverride { item: String, reason: String },
}

fn exceeded_note(items: &[String]) -> String {
    if items.is_empty() {
        String::new()
    } else {
        format!("; scaled fraction above 1.0 for {}", items.join(", "))
    }
}

impl ModelError {
    /// Whether the error must abort the whole run rather than a single unit
    pub fn is_fatal(&self) -> bool {
        matches!(self, ModelError::CalibrationConvergence { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_factor_names_item() {
        let err = ModelError::MissingFactor {
            diet: "Monitor 2024".to_string(),
            item: "Lamb".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Lamb"));
        assert!(msg.contains("Monitor 2024"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_only_calibration_is_fatal() {
        let err = ModelError::CalibrationConvergence {
            target_version: "monitor-2024".to_string(),
            target: 1_750_000.0,
            recomputed: 1_800_000.0,
            relative_error: 0.0286,
            tolerance: 0.001,
            exceeded: Vec::new(),
        };
        assert!(err.is_fatal());
        assert!(!err.to_string().contains("above 1.0"));
        assert!(!ModelError::UnknownDiet("x".to_string()).is_fatal());
        assert!(!ModelError::InvalidNeighborhood {
            id: "Noord".to_string(),
            reason: "population must be positive".to_string(),
        }
        .is_fatal());
    }
}
