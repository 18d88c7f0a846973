//! Position integration for the cursor plant.
//!
//! Every policy advances position along the velocity direction; they differ
//! only in the scalar applied to `dt * v`:
//!
//! | Policy | Gain on `dt * v` |
//! |--------|------------------|
//! | Linear | `1` |
//! | Power law | `scale * (s / scale)^exponent` |
//! | Threshold | `max(0, s - threshold) / s` |
//! | Static curve | `curve(s) / s` |
//!
//! where `s = |v|`. Every policy uses a gain of `1` at zero speed, which
//! leaves the position unchanged since `v` is zero. Without that guard a
//! power law with a negative exponent would evaluate `0^exponent = inf`.
//!
//! The power law scales `v` by the scaled speed itself rather than by a
//! ratio to `s`, so its displacement grows with `s^(exponent + 1)`.
//!
//! # Example
//!
//! ```
//! use nalgebra::DVector;
//! use reach_core::integrators::integrate;
//! use reach_types::Nonlinearity;
//!
//! let mut position = DVector::from_vec(vec![0.0, 1.0]);
//! let velocity = DVector::from_vec(vec![2.0, 0.0]);
//! integrate(&Nonlinearity::Linear, &mut position, &velocity, 0.5);
//! assert_eq!(position.as_slice(), &[1.0, 1.0]);
//! ```

use nalgebra::{DVector, Dim, Matrix, Storage, StorageMut, U1};
use reach_types::Nonlinearity;

/// Gain applied to `dt * v` for a velocity of magnitude `speed`.
#[must_use]
pub fn speed_gain(nonlinearity: &Nonlinearity, speed: f64) -> f64 {
    if speed == 0.0 {
        return 1.0;
    }
    match nonlinearity {
        Nonlinearity::Linear => 1.0,
        Nonlinearity::PowerLaw { exponent, scale } => scale * (speed / scale).powf(*exponent),
        Nonlinearity::Threshold { threshold } => (speed - threshold).max(0.0) / speed,
        Nonlinearity::StaticCurve(curve) => curve.evaluate(speed) / speed,
    }
}

/// Advance `position` in place by one step of `velocity`.
///
/// Works on owned vectors and on column views into trajectory buffers.
pub fn integrate<R, S1, S2>(
    nonlinearity: &Nonlinearity,
    position: &mut Matrix<f64, R, U1, S1>,
    velocity: &Matrix<f64, R, U1, S2>,
    dt: f64,
) where
    R: Dim,
    S1: StorageMut<f64, R, U1>,
    S2: Storage<f64, R, U1>,
{
    let gain = match nonlinearity {
        Nonlinearity::Linear => None,
        other => Some(speed_gain(other, velocity.norm())),
    };

    for (p, &v) in position.iter_mut().zip(velocity.iter()) {
        match gain {
            None => *p += dt * v,
            Some(g) => *p += dt * v * g,
        }
    }
}

/// Return the position reached from `position` after one step of `velocity`.
#[must_use]
pub fn integrated(
    nonlinearity: &Nonlinearity,
    position: &DVector<f64>,
    velocity: &DVector<f64>,
    dt: f64,
) -> DVector<f64> {
    let mut next = position.clone();
    integrate(nonlinearity, &mut next, velocity, dt);
    next
}
