//! Control law and control noise.
//!
//! The controller pushes the cursor along the predicted error direction and
//! along (or against) the predicted velocity direction:
//!
//! ```text
//! c = f_targ(|e|) * e / |e|  +  f_vel(|v|) * v / |v|
//!
//! where:
//!   e = target - predicted position
//!   v = predicted velocity
//! ```
//!
//! A term with a zero norm contributes nothing. The whole command is zeroed
//! inside the deadzone and during the reaction-time window. The decoded
//! command adds one pre-drawn noise column scaled by `f_noise(|c|)`.

use nalgebra::DVector;
use reach_types::{ControlConfig, NoiseConfig, SimulationConfig};

/// Why the controller issued the command it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// The control law was applied.
    Active,
    /// Predicted distance was within the deadzone.
    Deadzone,
    /// The step fell inside the reaction-time window.
    ReactionTime,
}

/// Controller output summary for one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Command {
    /// Predicted distance to the target.
    pub predicted_distance: f64,
    /// Predicted speed.
    pub predicted_speed: f64,
    /// Gating decision.
    pub gate: Gate,
}

/// Control law bound to one trial.
#[derive(Debug, Clone)]
pub struct Controller<'a> {
    config: &'a ControlConfig,
    target: &'a DVector<f64>,
    deadzone: f64,
}

impl<'a> Controller<'a> {
    /// Bind the control law to a trial's target and deadzone.
    #[must_use]
    pub fn new(config: &'a SimulationConfig) -> Self {
        Self {
            config: &config.control,
            target: &config.trial.target,
            deadzone: config.deadzone_radius(),
        }
    }

    /// Deadzone radius in effect.
    #[must_use]
    pub fn deadzone(&self) -> f64 {
        self.deadzone
    }

    /// Compute the clean command into `out`.
    ///
    /// `step` counts simulated steps from 1; steps up to and including
    /// `reaction_time_steps` produce a zero command.
    pub fn command(
        &self,
        position: &DVector<f64>,
        velocity: &DVector<f64>,
        step: usize,
        out: &mut DVector<f64>,
    ) -> Command {
        let distance = self.target.metric_distance(position);
        let speed = velocity.norm();

        let gate = if distance <= self.deadzone {
            Gate::Deadzone
        } else if step <= self.config.reaction_time_steps {
            Gate::ReactionTime
        } else {
            Gate::Active
        };

        if gate == Gate::Active {
            let target_weight = self.config.target_gain.evaluate(distance);
            let velocity_weight = self.config.velocity_gain.evaluate(speed);

            for j in 0..out.len() {
                let toward = if distance == 0.0 {
                    0.0
                } else {
                    (self.target[j] - position[j]) / distance * target_weight
                };
                let along = if speed == 0.0 {
                    0.0
                } else {
                    velocity[j] / speed * velocity_weight
                };
                out[j] = toward + along;
            }
        } else {
            out.fill(0.0);
        }

        Command {
            predicted_distance: distance,
            predicted_speed: speed,
            gate,
        }
    }
}

/// Cyclic cursor over the columns of the noise matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoiseCursor {
    column: usize,
    columns: usize,
}

impl NoiseCursor {
    /// Start at `column` of a matrix with `columns` columns.
    #[must_use]
    pub fn new(column: usize, columns: usize) -> Self {
        Self { column, columns }
    }

    /// Start where `noise` says.
    #[must_use]
    pub fn from_config(noise: &NoiseConfig) -> Self {
        Self::new(noise.start_column, noise.columns())
    }

    /// Column the next step will use.
    #[must_use]
    pub fn column(&self) -> usize {
        self.column
    }

    /// Move to the next column, wrapping to 0.
    pub fn advance(&mut self) {
        self.column += 1;
        if self.column >= self.columns {
            self.column = 0;
        }
    }
}

/// Add weighted noise column `column` to `clean`, writing into `decoded`.
///
/// Returns the noise weight that was applied.
pub fn inject_noise(
    noise: &NoiseConfig,
    column: usize,
    clean: &DVector<f64>,
    decoded: &mut DVector<f64>,
) -> f64 {
    let weight = noise.weight.evaluate(clean.norm());
    let sample = noise.samples.column(column);
    for j in 0..decoded.len() {
        decoded[j] = clean[j] + sample[j] * weight;
    }
    weight
}
