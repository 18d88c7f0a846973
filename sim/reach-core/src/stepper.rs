//! Trial loop.
//!
//! This module provides the [`Simulator`], which runs one reaching trial to
//! completion: forward-model prediction, control law, noise injection, plant
//! update and target acquisition, once per step.
//!
//! # Example
//!
//! ```
//! use nalgebra::DVector;
//! use reach_core::{PlantConfig, Simulator, SimulationConfig, TrialConfig, WarmStart};
//!
//! let trial = TrialConfig::new(DVector::from_vec(vec![1.0])).radius(0.1).dwell(0.0);
//! let config = SimulationConfig::new(0.05, PlantConfig::new(1), trial);
//! let simulator = Simulator::new(config).unwrap();
//!
//! let warm = WarmStart::at_rest(&DVector::zeros(1), 1);
//! let result = simulator.run(&warm).unwrap();
//! assert!(result.outcome.is_success());
//! ```

use nalgebra::DVector;
use reach_types::{
    PlantConfig, Result, SimError, SimulationConfig, SimulationState, StepRecord, TrialOutcome,
    TrialResult, WarmStart,
};
use tracing::{debug, trace, warn};

use crate::control::{Controller, NoiseCursor, inject_noise};
use crate::integrators::integrate;

/// Summary of a finished trial.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialSummary {
    /// How the trial ended.
    pub outcome: TrialOutcome,
    /// Number of simulated steps.
    pub steps: usize,
    /// One past the last written column.
    pub final_step: usize,
    /// Dwell time accumulated when the trial ended (seconds).
    pub dwell_time: f64,
    /// Noise column a follow-up trial should start from.
    pub next_noise_column: usize,
}

/// Per-step vectors, allocated once per trial.
#[derive(Debug)]
struct Workspace {
    estimated_position: DVector<f64>,
    estimated_velocity: DVector<f64>,
    true_position: DVector<f64>,
    true_velocity: DVector<f64>,
    clean_control: DVector<f64>,
    decoded_control: DVector<f64>,
    estimated_state: DVector<f64>,
    true_state: DVector<f64>,
}

impl Workspace {
    fn new(plant: &PlantConfig) -> Self {
        let n_dim = plant.n_dim;
        let state_rows = plant.state_rows();
        Self {
            estimated_position: DVector::zeros(n_dim),
            estimated_velocity: DVector::zeros(n_dim),
            true_position: DVector::zeros(n_dim),
            true_velocity: DVector::zeros(n_dim),
            clean_control: DVector::zeros(n_dim),
            decoded_control: DVector::zeros(n_dim),
            estimated_state: DVector::zeros(state_rows),
            true_state: DVector::zeros(state_rows),
        }
    }

    fn pack(&mut self) {
        let n_dim = self.true_position.len();
        self.estimated_state
            .rows_mut(0, n_dim)
            .copy_from(&self.estimated_position);
        self.estimated_state
            .rows_mut(n_dim, n_dim)
            .copy_from(&self.estimated_velocity);
        self.true_state
            .rows_mut(0, n_dim)
            .copy_from(&self.true_position);
        self.true_state
            .rows_mut(n_dim, n_dim)
            .copy_from(&self.true_velocity);
    }

    fn record(&self) -> StepRecord<'_> {
        StepRecord {
            true_state: &self.true_state,
            estimated_state: &self.estimated_state,
            clean_control: &self.clean_control,
            decoded_control: &self.decoded_control,
        }
    }
}

/// Runs reaching trials for a fixed, validated configuration.
///
/// The simulator holds no per-trial state; every run starts from the
/// caller's warm start.
#[derive(Debug, Clone)]
pub struct Simulator {
    config: SimulationConfig,
}

impl Simulator {
    /// Validate `config` and build a simulator for it.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;

        let forward_model = config.forward_model;
        if forward_model.overshoots_history() {
            warn!(
                delay_steps = forward_model.delay_steps,
                forward_steps = forward_model.forward_steps,
                "forward model predicts past the newest command; missing commands are treated as zero"
            );
        }

        Ok(Self { config })
    }

    /// The validated configuration.
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Run one trial from `warm_start`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `warm_start` does not fit the
    /// configuration, [`SimError::Diverged`] if the cursor state becomes
    /// non-finite, and [`SimError::CapacityExceeded`] if the buffers fill up
    /// before the trial ends.
    pub fn run(&self, warm_start: &WarmStart) -> Result<TrialResult> {
        let mut state = SimulationState::new(&self.config, warm_start)?;
        let summary = self.simulate(&mut state, NoiseCursor::from_config(&self.config.noise))?;
        Ok(state.into_result(
            summary.outcome,
            summary.dwell_time,
            summary.next_noise_column,
        ))
    }

    /// Run one trial, drawing noise from `noise_column` onward.
    ///
    /// Chaining `next_noise_column` from one result into the next trial
    /// keeps successive trials on fresh noise samples.
    ///
    /// # Errors
    ///
    /// As [`Simulator::run`], plus a configuration error if `noise_column`
    /// is out of range.
    pub fn run_with_noise_start(
        &self,
        warm_start: &WarmStart,
        noise_column: usize,
    ) -> Result<TrialResult> {
        let columns = self.config.noise.columns();
        if noise_column >= columns {
            return Err(SimError::invalid_config(format!(
                "noise column {noise_column} out of range for {columns} columns"
            )));
        }

        let mut state = SimulationState::new(&self.config, warm_start)?;
        let summary = self.simulate(&mut state, NoiseCursor::new(noise_column, columns))?;
        Ok(state.into_result(
            summary.outcome,
            summary.dwell_time,
            summary.next_noise_column,
        ))
    }

    /// Run one trial into caller-owned buffers.
    ///
    /// `state` is reset from `warm_start` first, so buffers from a previous
    /// trial can be reused.
    ///
    /// # Errors
    ///
    /// As [`Simulator::run`].
    pub fn run_in(
        &self,
        state: &mut SimulationState,
        warm_start: &WarmStart,
    ) -> Result<TrialSummary> {
        state.reset(&self.config, warm_start)?;
        self.simulate(state, NoiseCursor::from_config(&self.config.noise))
    }

    fn simulate(
        &self,
        state: &mut SimulationState,
        mut noise: NoiseCursor,
    ) -> Result<TrialSummary> {
        let config = &self.config;

        let n_dim = config.n_dim();
        let dt = config.loop_time;
        let plant = &config.plant;
        let trial = &config.trial;
        let forward_model = config.forward_model;
        let budget = config.step_budget();

        let controller = Controller::new(config);
        let mut ws = Workspace::new(plant);
        let mut dwell_time = 0.0;

        debug!(
            n_dim,
            history = state.history_len(),
            capacity = state.capacity(),
            budget,
            nonlinearity = %plant.nonlinearity,
            "starting trial"
        );

        let mut step = 1usize;
        let outcome = loop {
            let current = state.current_step();
            let observed = current - forward_model.lookback();

            // Forward model: integrate the delayed observation with the
            // commands issued since it was taken.
            let observation = state.true_column(observed);
            ws.estimated_position.copy_from(&observation.rows(0, n_dim));
            ws.estimated_velocity.copy_from(&observation.rows(n_dim, n_dim));
            for i in 0..forward_model.forward_steps {
                let column = observed + i;
                if column < current {
                    let command = state.clean_control_column(column);
                    for j in 0..n_dim {
                        ws.estimated_velocity[j] =
                            plant.smooth_velocity(ws.estimated_velocity[j], command[j]);
                    }
                } else {
                    for j in 0..n_dim {
                        ws.estimated_velocity[j] =
                            plant.smooth_velocity(ws.estimated_velocity[j], 0.0);
                    }
                }
                integrate(
                    &plant.nonlinearity,
                    &mut ws.estimated_position,
                    &ws.estimated_velocity,
                    dt,
                );
            }

            let command = controller.command(
                &ws.estimated_position,
                &ws.estimated_velocity,
                step,
                &mut ws.clean_control,
            );

            let noise_weight = inject_noise(
                &config.noise,
                noise.column(),
                &ws.clean_control,
                &mut ws.decoded_control,
            );

            // Plant: previous true state driven by this step's decoded command.
            let previous = state.true_column(current - 1);
            ws.true_position.copy_from(&previous.rows(0, n_dim));
            for j in 0..n_dim {
                ws.true_velocity[j] =
                    plant.smooth_velocity(previous[n_dim + j], ws.decoded_control[j]);
            }
            integrate(
                &plant.nonlinearity,
                &mut ws.true_position,
                &ws.true_velocity,
                dt,
            );

            if ws
                .true_position
                .iter()
                .chain(ws.true_velocity.iter())
                .any(|v| !v.is_finite())
            {
                return Err(SimError::diverged(format!(
                    "non-finite cursor state at step {step}"
                )));
            }

            let distance = ws.true_position.metric_distance(&trial.target);
            let inside = distance < trial.target_radius;
            if inside {
                dwell_time += dt;
            } else if trial.continuous_hold {
                dwell_time = 0.0;
            }

            ws.pack();
            let column = state.record(ws.record())?;
            noise.advance();

            trace!(
                step,
                column,
                distance,
                predicted_distance = command.predicted_distance,
                gate = ?command.gate,
                noise_weight,
                dwell_time,
                "step"
            );

            if inside && dwell_time >= trial.dwell_time {
                break TrialOutcome::TargetAcquired;
            }
            if step as f64 * dt >= trial.max_trial_time || step >= budget {
                break TrialOutcome::TimeExpired;
            }
            step += 1;
        };

        let summary = TrialSummary {
            outcome,
            steps: state.steps_simulated(),
            final_step: state.current_step(),
            dwell_time,
            next_noise_column: noise.column(),
        };

        debug!(
            outcome = %summary.outcome,
            steps = summary.steps,
            final_step = summary.final_step,
            dwell_time = summary.dwell_time,
            "trial finished"
        );

        Ok(summary)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::cast_precision_loss
)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;
    use reach_types::{
        ControlConfig, Deadzone, ForwardModelConfig, NoiseConfig, PiecewiseLinear, PlantConfig,
        TrialConfig,
    };

    fn reach_1d(target: f64) -> SimulationConfig {
        let trial = TrialConfig::new(DVector::from_vec(vec![target]))
            .radius(1.0)
            .dwell(0.0)
            .timeout(100.0);
        SimulationConfig::new(0.1, PlantConfig::new(1).smoothing(0.9, 1.0), trial)
    }

    fn at(position: f64) -> WarmStart {
        WarmStart::at_rest(&DVector::from_vec(vec![position]), 1)
    }

    #[test]
    fn test_forward_model_one_step() {
        // With no delay and one forward step the estimate integrates the
        // previous true state with the previous command.
        let config = reach_1d(10.0);
        let simulator = Simulator::new(config).unwrap();

        let history = DMatrix::from_column_slice(2, 1, &[2.0, 1.0]);
        let control = DMatrix::from_column_slice(1, 1, &[3.0]);
        let warm = WarmStart::new(history, control).unwrap();
        let result = simulator.run(&warm).unwrap();

        let v_hat = 0.9 * 1.0 + 0.1 * 3.0;
        assert_relative_eq!(result.estimated_state[(1, 1)], v_hat, epsilon = 1e-12);
        assert_relative_eq!(
            result.estimated_state[(0, 1)],
            2.0 + 0.1 * v_hat,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_true_state_uses_current_decoded_command() {
        let simulator = Simulator::new(reach_1d(10.0)).unwrap();
        let result = simulator.run(&at(0.0)).unwrap();

        // Constant target gain of 1 along +x, no noise.
        assert_eq!(result.clean_control[(0, 1)], 1.0);
        assert_eq!(result.decoded_control[(0, 1)], 1.0);
        let v = 0.1 * 1.0;
        assert_relative_eq!(result.true_state[(1, 1)], v, epsilon = 1e-12);
        assert_relative_eq!(result.true_state[(0, 1)], 0.1 * v, epsilon = 1e-12);
    }

    #[test]
    fn test_noise_is_scaled_and_cycled() {
        let samples = DMatrix::from_row_slice(1, 3, &[1.0, 2.0, 3.0]);
        let noise = NoiseConfig::new(PiecewiseLinear::constant(0.5), samples).start_at(1);
        let config = reach_1d(1000.0).noise(noise);
        let simulator = Simulator::new(config).unwrap();
        let result = simulator.run(&at(0.0)).unwrap();

        let expected = [2.0, 3.0, 1.0, 2.0, 3.0];
        for (k, sample) in expected.iter().enumerate() {
            let column = 1 + k;
            let injected =
                result.decoded_control[(0, column)] - result.clean_control[(0, column)];
            assert_relative_eq!(injected, 0.5 * sample, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_next_noise_column() {
        let samples = DMatrix::from_row_slice(1, 4, &[0.0, 0.0, 0.0, 0.0]);
        let mut config =
            reach_1d(1000.0).noise(NoiseConfig::new(PiecewiseLinear::zero(), samples));
        config.trial.max_trial_time = 0.5; // 5 steps
        let simulator = Simulator::new(config).unwrap();

        let result = simulator.run_with_noise_start(&at(0.0), 2).unwrap();
        assert_eq!(result.steps(), 5);
        assert_eq!(result.next_noise_column, (2 + 5) % 4);

        assert!(simulator.run_with_noise_start(&at(0.0), 4).is_err());
    }

    #[test]
    fn test_deadzone_stops_command() {
        let mut config = reach_1d(10.0).control(
            ControlConfig::new(PiecewiseLinear::constant(1.0), PiecewiseLinear::zero())
                .deadzone(Deadzone::Radius(20.0)),
        );
        config.trial.max_trial_time = 1.0;
        let simulator = Simulator::new(config).unwrap();

        let result = simulator.run(&at(0.0)).unwrap();
        assert_eq!(result.outcome, TrialOutcome::TimeExpired);
        for k in 1..result.final_step {
            assert_eq!(result.clean_control[(0, k)], 0.0);
            assert_eq!(result.true_state[(0, k)], 0.0);
        }
    }

    #[test]
    fn test_delay_reads_older_state() {
        let config = reach_1d(10.0).forward_model(ForwardModelConfig::new(2, 0));
        let simulator = Simulator::new(config).unwrap();

        let history = DMatrix::from_column_slice(2, 3, &[5.0, 0.0, 6.0, 0.0, 7.0, 0.0]);
        let warm = WarmStart::new(history, DMatrix::zeros(1, 3)).unwrap();
        let result = simulator.run(&warm).unwrap();

        // No forward steps: the estimate is the raw observation from
        // column 3 - 2 - 1 = 0.
        assert_eq!(result.estimated_state[(0, 3)], 5.0);
        assert_eq!(result.estimated_state[(0, 4)], 6.0);
    }

    #[test]
    fn test_forward_steps_past_history_see_zero_command() {
        let config = reach_1d(10.0).forward_model(ForwardModelConfig::new(0, 3));
        let simulator = Simulator::new(config).unwrap();

        let history = DMatrix::from_column_slice(2, 1, &[0.0, 0.0]);
        let control = DMatrix::from_column_slice(1, 1, &[1.0]);
        let warm = WarmStart::new(history, control).unwrap();
        let result = simulator.run(&warm).unwrap();

        // One real command, then two zero commands.
        let v1 = 0.1;
        let v2 = 0.9 * v1;
        let v3 = 0.9 * v2;
        assert_relative_eq!(result.estimated_state[(1, 1)], v3, epsilon = 1e-12);
        assert_relative_eq!(
            result.estimated_state[(0, 1)],
            0.1 * (v1 + v2 + v3),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_divergence_is_reported() {
        let simulator = Simulator::new(reach_1d(0.0)).unwrap();
        let history = DMatrix::from_column_slice(2, 1, &[f64::MAX, f64::MAX]);
        let warm = WarmStart::new(history, DMatrix::zeros(1, 1)).unwrap();

        let err = simulator.run(&warm).unwrap_err();
        assert!(err.is_diverged());
    }

    #[test]
    fn test_run_in_reuses_buffers() {
        let simulator = Simulator::new(reach_1d(10.0)).unwrap();
        let warm = at(0.0);

        let fresh = simulator.run(&warm).unwrap();

        let mut state = SimulationState::new(simulator.config(), &at(-3.0)).unwrap();
        simulator.run_in(&mut state, &at(-3.0)).unwrap();
        let summary = simulator.run_in(&mut state, &warm).unwrap();

        assert_eq!(summary.outcome, fresh.outcome);
        assert_eq!(summary.final_step, fresh.final_step);
        assert_eq!(state.true_state(), &fresh.true_state);
        assert_eq!(state.estimated_state(), &fresh.estimated_state);
        assert_eq!(state.decoded_control(), &fresh.decoded_control);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = reach_1d(1.0);
        config.loop_time = -1.0;
        assert!(Simulator::new(config).unwrap_err().is_config_error());

        let simulator = Simulator::new(reach_1d(1.0)).unwrap();
        let wrong = WarmStart::at_rest(&DVector::zeros(2), 1);
        assert!(simulator.run(&wrong).unwrap_err().is_config_error());
    }

    #[test]
    fn test_non_finite_history_rejected_before_stepping() {
        let config = reach_1d(10.0).control(ControlConfig::new(
            PiecewiseLinear::constant(1.0),
            PiecewiseLinear::new(vec![0.0, 1.0], vec![0.0, -0.5]).unwrap(),
        ));
        let simulator = Simulator::new(config).unwrap();

        let control = DMatrix::from_element(1, 1, f64::NAN);
        let warm = WarmStart::new(DMatrix::zeros(2, 1), control).unwrap();
        let err = simulator.run(&warm).unwrap_err();
        assert!(matches!(err, SimError::InvalidConfig { .. }));
    }

    #[test]
    fn test_oversized_budget_rejected() {
        let mut config = reach_1d(10.0);
        config.loop_time = 1e-300;
        config.trial.max_trial_time = f64::MAX;
        assert!(Simulator::new(config).unwrap_err().is_config_error());
    }
}
