//! Piecewise-linear gain curves.
//!
//! Every scalar mapping in the simulator (static plant nonlinearity, noise
//! weight, target gain, velocity gain) is a [`PiecewiseLinear`] curve defined
//! by a handful of knots.
//!
//! ```text
//!  y
//!  │            ●───────●
//!  │          ╱           ╲
//!  │        ╱               ●  ─ ─ extrapolated
//!  │  ─ ─ ●
//!  └──────┴─────┴───────┴───┴──── x
//!        x0    x1      x2  x3
//! ```
//!
//! # Example
//!
//! ```
//! use reach_types::PiecewiseLinear;
//!
//! let gain = PiecewiseLinear::new(vec![0.0, 1.0, 2.0], vec![0.0, 1.0, 1.0]).unwrap();
//! assert_eq!(gain.evaluate(0.5), 0.5);
//! assert_eq!(gain.evaluate(1.5), 1.0);
//!
//! let constant = PiecewiseLinear::constant(3.0);
//! assert_eq!(constant.evaluate(-1.0e9), 3.0);
//! ```

use crate::{Result, SimError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum number of knots in a curve.
pub const MAX_KNOTS: usize = 100;

/// Behavior of a curve outside its first and last knots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Extrapolation {
    /// Extend the first and last segments with their own slopes.
    #[default]
    Linear,
    /// Hold the first and last y-values.
    Clamp,
}

/// A scalar function defined by linear interpolation between knots.
///
/// Knot x-values are strictly increasing. A single-knot curve is constant.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PiecewiseLinear {
    xs: Vec<f64>,
    ys: Vec<f64>,
    extrapolation: Extrapolation,
}

impl PiecewiseLinear {
    /// Create a curve from parallel knot coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidConfig`] if there are no knots, more than
    /// [`MAX_KNOTS`], mismatched lengths, non-finite values, or x-values that
    /// are not strictly increasing.
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Result<Self> {
        if xs.is_empty() {
            return Err(SimError::invalid_config("curve needs at least one knot"));
        }
        if xs.len() != ys.len() {
            return Err(SimError::invalid_config(format!(
                "curve has {} x-values but {} y-values",
                xs.len(),
                ys.len()
            )));
        }
        if xs.len() > MAX_KNOTS {
            return Err(SimError::invalid_config(format!(
                "curve has {} knots (max {MAX_KNOTS})",
                xs.len()
            )));
        }
        if xs.iter().chain(&ys).any(|v| !v.is_finite()) {
            return Err(SimError::invalid_config("curve knots must be finite"));
        }
        if let Some(k) = xs.windows(2).position(|w| w[1] <= w[0]) {
            return Err(SimError::invalid_config(format!(
                "curve x-values must be strictly increasing (x[{}] = {} >= x[{}] = {})",
                k,
                xs[k],
                k + 1,
                xs[k + 1]
            )));
        }

        Ok(Self {
            xs,
            ys,
            extrapolation: Extrapolation::Linear,
        })
    }

    /// Create a curve from `(x, y)` pairs.
    ///
    /// # Errors
    ///
    /// Same conditions as [`PiecewiseLinear::new`].
    pub fn from_knots(knots: &[(f64, f64)]) -> Result<Self> {
        let (xs, ys) = knots.iter().copied().unzip();
        Self::new(xs, ys)
    }

    /// A curve returning `value` everywhere.
    #[must_use]
    pub fn constant(value: f64) -> Self {
        Self {
            xs: vec![0.0],
            ys: vec![value],
            extrapolation: Extrapolation::Linear,
        }
    }

    /// A curve returning zero everywhere.
    #[must_use]
    pub fn zero() -> Self {
        Self::constant(0.0)
    }

    /// Set the extrapolation policy.
    #[must_use]
    pub fn with_extrapolation(mut self, extrapolation: Extrapolation) -> Self {
        self.extrapolation = extrapolation;
        self
    }

    /// Extrapolation policy.
    #[must_use]
    pub fn extrapolation(&self) -> Extrapolation {
        self.extrapolation
    }

    /// Number of knots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    /// Always false; a curve has at least one knot.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    /// Knot x-values.
    #[must_use]
    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    /// Knot y-values.
    #[must_use]
    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    /// Iterate over `(x, y)` knots.
    pub fn knots(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.xs.iter().copied().zip(self.ys.iter().copied())
    }

    /// Evaluate the curve at `x`.
    ///
    /// A NaN input evaluates to NaN, except on a single-knot curve, which is
    /// constant everywhere.
    #[must_use]
    pub fn evaluate(&self, x: f64) -> f64 {
        let n = self.xs.len();
        if n == 1 {
            return self.ys[0];
        }
        if x.is_nan() {
            return f64::NAN;
        }

        if x <= self.xs[0] {
            return match self.extrapolation {
                Extrapolation::Linear => self.lerp(1, x),
                Extrapolation::Clamp => self.ys[0],
            };
        }
        if x >= self.xs[n - 1] {
            return match self.extrapolation {
                Extrapolation::Linear => self.lerp(n - 1, x),
                Extrapolation::Clamp => self.ys[n - 1],
            };
        }

        // First knot strictly above x; xs[0] < x < xs[n-1] keeps k in 1..n.
        let k = self.xs.partition_point(|&xk| xk <= x);
        self.lerp(k.max(1), x)
    }

    /// Interpolate (or extend) the segment ending at knot `k`.
    fn lerp(&self, k: usize, x: f64) -> f64 {
        let (x0, x1) = (self.xs[k - 1], self.xs[k]);
        let (y0, y1) = (self.ys[k - 1], self.ys[k]);
        let t = (x - x0) / (x1 - x0);
        (1.0 - t) * y0 + t * y1
    }
}
