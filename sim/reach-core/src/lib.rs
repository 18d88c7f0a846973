//! Closed-loop reaching simulation engine.
//!
//! This crate simulates a cursor driven toward a target by a controller that
//! only sees a delayed copy of the cursor state and must predict the present
//! with an internal forward model. It builds on [`reach_types`] for the data
//! structures.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Simulator                             │
//! │  Per step: predict → control → noise → plant → acquisition   │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │                              │
//!                ▼                              ▼
//! ┌──────────────────────────────┐ ┌─────────────────────────────┐
//! │           control            │ │         integrators          │
//! │  Gain curves, deadzone,      │ │  Linear, power-law,          │
//! │  reaction time, noise        │ │  threshold, static curve     │
//! └──────────────────────────────┘ └─────────────────────────────┘
//! ```
//!
//! # Step Order
//!
//! 1. Copy the true state from `delay_steps + 1` steps ago and integrate it
//!    `forward_steps` times with the commands issued since.
//! 2. Evaluate the control law on the prediction.
//! 3. Add the next pre-drawn noise column, scaled by the noise curve.
//! 4. Drive the true plant from the previous true state with the noisy command.
//! 5. Update dwell time and check for acquisition or timeout.
//!
//! # Quick Start
//!
//! ```
//! use nalgebra::{DMatrix, DVector};
//! use reach_core::{
//!     ControlConfig, ForwardModelConfig, NoiseConfig, PiecewiseLinear, PlantConfig,
//!     SimulationConfig, Simulator, TrialConfig, TrialOutcome, WarmStart,
//! };
//!
//! let trial = TrialConfig::new(DVector::from_vec(vec![0.5, 0.5]))
//!     .radius(0.05)
//!     .dwell(0.1)
//!     .timeout(5.0);
//! let control = ControlConfig::new(
//!     PiecewiseLinear::new(vec![0.0, 0.2], vec![0.0, 1.0]).unwrap(),
//!     PiecewiseLinear::constant(-0.2),
//! );
//! let noise = NoiseConfig::new(PiecewiseLinear::zero(), DMatrix::zeros(2, 16));
//!
//! let config = SimulationConfig::new(0.02, PlantConfig::new(2), trial)
//!     .forward_model(ForwardModelConfig::compensating(5))
//!     .control(control)
//!     .noise(noise);
//!
//! let simulator = Simulator::new(config).unwrap();
//! let warm = WarmStart::at_rest(&DVector::zeros(2), 6);
//! let result = simulator.run(&warm).unwrap();
//!
//! println!("{} after {} steps", result.outcome, result.steps());
//! assert!(matches!(
//!     result.outcome,
//!     TrialOutcome::TargetAcquired | TrialOutcome::TimeExpired
//! ));
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::cast_precision_loss,       // step counts to f64 are exact in range
)]

pub mod control;
pub mod integrators;
mod stepper;

pub use control::{Command, Controller, Gate, NoiseCursor};
pub use stepper::{Simulator, TrialSummary};

// Re-export key types from reach-types for convenience
pub use reach_types::{
    ControlConfig, Deadzone, Extrapolation, ForwardModelConfig, Nonlinearity, NoiseConfig,
    PiecewiseLinear, PlantConfig, Result, SimError, SimulationConfig, SimulationState,
    TrialConfig, TrialOutcome, TrialResult, WarmStart,
};
