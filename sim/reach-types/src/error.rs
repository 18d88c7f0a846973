//! Error types for simulation operations.

use thiserror::Error;

/// Errors that can occur while configuring or running a trial.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// A vector or matrix does not have the size implied by `n_dim`.
    #[error("dimension mismatch in {field}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Name of the offending field.
        field: &'static str,
        /// Expected length (or row count).
        expected: usize,
        /// Actual length (or row count).
        actual: usize,
    },

    /// Invalid loop time.
    #[error("invalid loop time: {0} (must be positive and finite)")]
    InvalidTimestep(f64),

    /// A step would be written past the pre-sized trajectory buffers.
    ///
    /// This is never caused by user input that passed validation; it means
    /// the buffers were sized for a different configuration.
    #[error("step {step} exceeds trajectory capacity {capacity}")]
    CapacityExceeded {
        /// Column the engine attempted to write.
        step: usize,
        /// Number of columns in the buffers.
        capacity: usize,
    },

    /// Simulation diverged (`NaN` or `Inf` detected).
    #[error("simulation diverged: {reason}")]
    Diverged {
        /// Description of what went wrong.
        reason: String,
    },
}

impl SimError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a dimension mismatch error.
    #[must_use]
    pub fn dimension_mismatch(field: &'static str, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            field,
            expected,
            actual,
        }
    }

    /// Create a diverged error.
    #[must_use]
    pub fn diverged(reason: impl Into<String>) -> Self {
        Self::Diverged {
            reason: reason.into(),
        }
    }

    /// Check if this error was raised while validating configuration.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. } | Self::DimensionMismatch { .. } | Self::InvalidTimestep(_)
        )
    }

    /// Check if this error signals a broken internal invariant.
    #[must_use]
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }

    /// Check if this is a divergence error.
    #[must_use]
    pub fn is_diverged(&self) -> bool {
        matches!(self, Self::Diverged { .. })
    }
}
