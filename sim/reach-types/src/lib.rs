//! Core types for closed-loop reaching simulation.
//!
//! This crate provides the data model of a simulated cursor-reaching trial:
//!
//! - [`PiecewiseLinear`] - Knot-based gain curves
//! - [`PlantConfig`] / [`Nonlinearity`] - Velocity filter and position integration policy
//! - [`TrialConfig`], [`ForwardModelConfig`], [`ControlConfig`], [`NoiseConfig`]
//! - [`SimulationConfig`] - Everything a trial needs, validated once
//! - [`WarmStart`] / [`SimulationState`] - Trajectory history and pre-sized buffers
//! - [`TrialResult`] - Trajectories handed back to the caller
//!
//! # Design Philosophy
//!
//! These types are **pure data** plus validation. The only numeric behavior
//! here is curve evaluation and the one-line velocity filter; plant
//! integration, the control law and the trial loop live in `reach-core`.
//!
//! # Example
//!
//! ```
//! use nalgebra::DVector;
//! use reach_types::{
//!     ControlConfig, PiecewiseLinear, PlantConfig, SimulationConfig, TrialConfig, WarmStart,
//! };
//!
//! let trial = TrialConfig::new(DVector::from_vec(vec![0.1, 0.0]))
//!     .radius(0.02)
//!     .timeout(2.0);
//! let config = SimulationConfig::new(0.5, PlantConfig::new(2), trial).control(
//!     ControlConfig::new(PiecewiseLinear::constant(1.0), PiecewiseLinear::zero()),
//! );
//! assert!(config.validate().is_ok());
//!
//! let warm = WarmStart::at_rest(&DVector::zeros(2), 1);
//! assert_eq!(config.capacity(warm.history_len()).unwrap(), 1 + 4);
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::cast_precision_loss,       // usize to f64 is fine for counts
    clippy::missing_errors_doc,        // Error docs added where non-obvious
)]

mod config;
mod curve;
mod error;
mod plant;
mod state;

pub use config::{
    ControlConfig, Deadzone, ForwardModelConfig, MAX_STEP_BUDGET, NoiseConfig, SimulationConfig,
    TrialConfig,
};
pub use curve::{Extrapolation, MAX_KNOTS, PiecewiseLinear};
pub use error::SimError;
pub use plant::{MAX_DIM, Nonlinearity, PlantConfig};
pub use state::{SimulationState, StepRecord, TrialOutcome, TrialResult, WarmStart};

// Re-export math types for convenience
pub use nalgebra::{DMatrix, DVector};

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;
