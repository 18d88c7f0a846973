//! Cursor plant parameters.
//!
//! The plant is a first-order low-pass filter on velocity followed by a
//! (possibly nonlinear) integration of velocity into position:
//!
//! ```text
//! v(t+1) = alpha * v(t) + beta * (1 - alpha) * u(t)
//! p(t+1) = p(t) + dt * v(t+1) * g(|v(t+1)|)
//! ```
//!
//! where the speed gain `g` is selected by [`Nonlinearity`].

use crate::{PiecewiseLinear, Result, SimError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum number of spatial axes.
pub const MAX_DIM: usize = 100;

/// How velocity is integrated into position.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Nonlinearity {
    /// Pass-through: `p + dt * v`.
    #[default]
    Linear,
    /// Displacement scaled by `scale * (|v| / scale)^exponent`.
    ///
    /// The factor is an absolute speed, not a ratio to `|v|`, so the
    /// effective displacement grows with the square of speed when
    /// `exponent == 1`.
    PowerLaw {
        /// Exponent applied to the normalized speed.
        exponent: f64,
        /// Speed normalization.
        scale: f64,
    },
    /// Speed reduced by a dead band: `max(0, |v| - threshold)`.
    Threshold {
        /// Speeds at or below this value produce no movement.
        threshold: f64,
    },
    /// Speed remapped through a curve.
    StaticCurve(PiecewiseLinear),
}

impl Nonlinearity {
    /// Build from the legacy integer selector and its shared parameters.
    ///
    /// | code | variant |
    /// |------|---------|
    /// | 0 | [`Linear`](Self::Linear) |
    /// | 1 | [`PowerLaw`](Self::PowerLaw) with `exponent = n1`, `scale = n2` |
    /// | 2 | [`Threshold`](Self::Threshold) with `threshold = n1` |
    /// | 3 | [`StaticCurve`](Self::StaticCurve) with `curve` |
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidConfig`] for an unknown code.
    pub fn from_code(code: i32, n1: f64, n2: f64, curve: PiecewiseLinear) -> Result<Self> {
        match code {
            0 => Ok(Self::Linear),
            1 => Ok(Self::PowerLaw {
                exponent: n1,
                scale: n2,
            }),
            2 => Ok(Self::Threshold { threshold: n1 }),
            3 => Ok(Self::StaticCurve(curve)),
            other => Err(SimError::invalid_config(format!(
                "unknown nonlinearity code {other} (expected 0..=3)"
            ))),
        }
    }

    /// The legacy integer selector for this variant.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::Linear => 0,
            Self::PowerLaw { .. } => 1,
            Self::Threshold { .. } => 2,
            Self::StaticCurve(_) => 3,
        }
    }

    /// Validate the variant parameters.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Linear | Self::StaticCurve(_) => Ok(()),
            Self::PowerLaw { exponent, scale } => {
                if !exponent.is_finite() {
                    return Err(SimError::invalid_config("power-law exponent must be finite"));
                }
                if !scale.is_finite() || *scale == 0.0 {
                    return Err(SimError::invalid_config(
                        "power-law scale must be finite and non-zero",
                    ));
                }
                Ok(())
            }
            Self::Threshold { threshold } => {
                if threshold.is_finite() {
                    Ok(())
                } else {
                    Err(SimError::invalid_config("speed threshold must be finite"))
                }
            }
        }
    }
}

impl std::fmt::Display for Nonlinearity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linear => write!(f, "linear"),
            Self::PowerLaw { exponent, scale } => {
                write!(f, "power-law (exponent {exponent}, scale {scale})")
            }
            Self::Threshold { threshold } => write!(f, "threshold ({threshold})"),
            Self::StaticCurve(curve) => write!(f, "static curve ({} knots)", curve.len()),
        }
    }
}

/// Cursor plant configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlantConfig {
    /// Number of spatial axes.
    pub n_dim: usize,
    /// Velocity smoothing pole (0 = no memory).
    pub alpha: f64,
    /// Control-to-velocity gain.
    pub beta: f64,
    /// Position integration policy.
    pub nonlinearity: Nonlinearity,
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            n_dim: 2,
            alpha: 0.9,
            beta: 1.0,
            nonlinearity: Nonlinearity::Linear,
        }
    }
}

impl PlantConfig {
    /// Create a linear plant with the given dimensionality.
    #[must_use]
    pub fn new(n_dim: usize) -> Self {
        Self {
            n_dim,
            ..Default::default()
        }
    }

    /// Set the smoothing coefficients.
    #[must_use]
    pub fn smoothing(mut self, alpha: f64, beta: f64) -> Self {
        self.alpha = alpha;
        self.beta = beta;
        self
    }

    /// Set the integration policy.
    #[must_use]
    pub fn nonlinearity(mut self, nonlinearity: Nonlinearity) -> Self {
        self.nonlinearity = nonlinearity;
        self
    }

    /// Rows of a state column (position followed by velocity).
    #[must_use]
    pub const fn state_rows(&self) -> usize {
        2 * self.n_dim
    }

    /// One step of the velocity filter for a single axis.
    #[must_use]
    pub fn smooth_velocity(&self, velocity: f64, control: f64) -> f64 {
        self.alpha * velocity + self.beta * (1.0 - self.alpha) * control
    }

    /// Validate the plant configuration.
    pub fn validate(&self) -> Result<()> {
        if self.n_dim == 0 || self.n_dim > MAX_DIM {
            return Err(SimError::invalid_config(format!(
                "n_dim must be in 1..={MAX_DIM}, got {}",
                self.n_dim
            )));
        }
        if !self.alpha.is_finite() || !self.beta.is_finite() {
            return Err(SimError::invalid_config("alpha and beta must be finite"));
        }
        self.nonlinearity.validate()
    }
}
