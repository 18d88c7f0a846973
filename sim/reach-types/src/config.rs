//! Configuration types for a reaching trial.
//!
//! A [`SimulationConfig`] bundles everything the engine needs: loop time,
//! trial rules, plant, forward model, controller and noise source. It is
//! validated once and then treated as immutable for the whole trial.

use nalgebra::{DMatrix, DVector};

use crate::{MAX_DIM, PiecewiseLinear, PlantConfig, Result, SimError};

/// Largest step budget a configuration may request.
///
/// Keeps the byte size of the widest trajectory buffer within `isize::MAX`.
pub const MAX_STEP_BUDGET: usize = isize::MAX as usize / (2 * MAX_DIM * size_of::<f64>());

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Target and acquisition rules for a single movement.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrialConfig {
    /// Target position (length `n_dim`).
    pub target: DVector<f64>,
    /// Acquisition radius around the target.
    pub target_radius: f64,
    /// Time the cursor must spend inside the radius (seconds).
    pub dwell_time: f64,
    /// Trial timeout (seconds).
    pub max_trial_time: f64,
    /// Reset the dwell timer whenever the cursor leaves the target.
    ///
    /// When false, dwell time accumulates over the whole trial.
    pub continuous_hold: bool,
}

impl TrialConfig {
    /// Create a trial toward `target` with default acquisition rules.
    #[must_use]
    pub fn new(target: DVector<f64>) -> Self {
        Self {
            target,
            target_radius: 0.05,
            dwell_time: 0.5,
            max_trial_time: 10.0,
            continuous_hold: true,
        }
    }

    /// Set the acquisition radius.
    #[must_use]
    pub fn radius(mut self, radius: f64) -> Self {
        self.target_radius = radius;
        self
    }

    /// Set the required dwell time.
    #[must_use]
    pub fn dwell(mut self, dwell_time: f64) -> Self {
        self.dwell_time = dwell_time;
        self
    }

    /// Set the timeout.
    #[must_use]
    pub fn timeout(mut self, max_trial_time: f64) -> Self {
        self.max_trial_time = max_trial_time;
        self
    }

    /// Set the hold rule.
    #[must_use]
    pub fn continuous_hold(mut self, continuous: bool) -> Self {
        self.continuous_hold = continuous;
        self
    }

    /// Validate against the plant dimensionality.
    pub fn validate(&self, n_dim: usize) -> Result<()> {
        if self.target.len() != n_dim {
            return Err(SimError::dimension_mismatch(
                "trial.target",
                n_dim,
                self.target.len(),
            ));
        }
        if self.target.iter().any(|v| !v.is_finite()) {
            return Err(SimError::invalid_config("target position must be finite"));
        }
        if !self.target_radius.is_finite() || self.target_radius < 0.0 {
            return Err(SimError::invalid_config(
                "target radius must be finite and non-negative",
            ));
        }
        if !self.dwell_time.is_finite() || self.dwell_time < 0.0 {
            return Err(SimError::invalid_config(
                "dwell time must be finite and non-negative",
            ));
        }
        if !self.max_trial_time.is_finite() || self.max_trial_time <= 0.0 {
            return Err(SimError::invalid_config(
                "max trial time must be finite and positive",
            ));
        }
        Ok(())
    }
}

/// Delay and look-ahead of the internal forward model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ForwardModelConfig {
    /// Age of the observed state, in steps, beyond the one-step loop delay.
    pub delay_steps: usize,
    /// Number of internal integration steps used to predict forward.
    pub forward_steps: usize,
}

impl ForwardModelConfig {
    /// Create a forward model configuration.
    #[must_use]
    pub const fn new(delay_steps: usize, forward_steps: usize) -> Self {
        Self {
            delay_steps,
            forward_steps,
        }
    }

    /// A forward model that exactly compensates its own delay.
    #[must_use]
    pub const fn compensating(delay_steps: usize) -> Self {
        Self::new(delay_steps, delay_steps + 1)
    }

    /// Offset from the current column back to the observed column.
    #[must_use]
    pub const fn lookback(&self) -> usize {
        self.delay_steps + 1
    }

    /// Whether the prediction would read control that has not been produced yet.
    #[must_use]
    pub const fn overshoots_history(&self) -> bool {
        self.forward_steps > self.lookback()
    }
}

/// Distance below which the controller issues no command.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Deadzone {
    /// Use the trial's target radius.
    #[default]
    TargetRadius,
    /// Fixed radius.
    Radius(f64),
}

impl Deadzone {
    /// Sentinel used by legacy configurations to request the target radius.
    pub const TARGET_RADIUS_SENTINEL: f64 = -1.0;

    /// Map a legacy scalar setting, where `-1` means "use the target radius".
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn from_legacy(value: f64) -> Self {
        if value == Self::TARGET_RADIUS_SENTINEL {
            Self::TargetRadius
        } else {
            Self::Radius(value)
        }
    }

    /// Resolve against a trial.
    #[must_use]
    pub fn resolve(&self, trial: &TrialConfig) -> f64 {
        match *self {
            Self::TargetRadius => trial.target_radius,
            Self::Radius(r) => r,
        }
    }
}

/// Controller gain curves and gating.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ControlConfig {
    /// Gain along the target direction as a function of predicted distance.
    pub target_gain: PiecewiseLinear,
    /// Gain along the velocity direction as a function of predicted speed.
    pub velocity_gain: PiecewiseLinear,
    /// Deadzone around the target.
    pub deadzone: Deadzone,
    /// Number of initial steps with zero command.
    pub reaction_time_steps: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            target_gain: PiecewiseLinear::constant(1.0),
            velocity_gain: PiecewiseLinear::zero(),
            deadzone: Deadzone::TargetRadius,
            reaction_time_steps: 0,
        }
    }
}

impl ControlConfig {
    /// Create a controller from its two gain curves.
    #[must_use]
    pub fn new(target_gain: PiecewiseLinear, velocity_gain: PiecewiseLinear) -> Self {
        Self {
            target_gain,
            velocity_gain,
            ..Default::default()
        }
    }

    /// Set the deadzone.
    #[must_use]
    pub fn deadzone(mut self, deadzone: Deadzone) -> Self {
        self.deadzone = deadzone;
        self
    }

    /// Set the reaction time in steps.
    #[must_use]
    pub fn reaction_time(mut self, steps: usize) -> Self {
        self.reaction_time_steps = steps;
        self
    }

    /// Validate the controller.
    pub fn validate(&self) -> Result<()> {
        if let Deadzone::Radius(r) = self.deadzone {
            if !r.is_finite() {
                return Err(SimError::invalid_config("deadzone radius must be finite"));
            }
        }
        Ok(())
    }
}

/// Pre-drawn noise added to the control vector.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NoiseConfig {
    /// Noise scale as a function of clean control magnitude.
    pub weight: PiecewiseLinear,
    /// Noise samples, one column per step (`n_dim` rows).
    pub samples: DMatrix<f64>,
    /// Column used on the first simulated step.
    pub start_column: usize,
}

impl NoiseConfig {
    /// Create a noise source from a weight curve and a sample matrix.
    #[must_use]
    pub fn new(weight: PiecewiseLinear, samples: DMatrix<f64>) -> Self {
        Self {
            weight,
            samples,
            start_column: 0,
        }
    }

    /// A noise source that never perturbs the control vector.
    #[must_use]
    pub fn silent(n_dim: usize) -> Self {
        Self::new(PiecewiseLinear::zero(), DMatrix::zeros(n_dim, 1))
    }

    /// Set the starting column.
    #[must_use]
    pub fn start_at(mut self, column: usize) -> Self {
        self.start_column = column;
        self
    }

    /// Number of noise columns.
    #[must_use]
    pub fn columns(&self) -> usize {
        self.samples.ncols()
    }

    /// Validate against the plant dimensionality.
    pub fn validate(&self, n_dim: usize) -> Result<()> {
        if self.samples.nrows() != n_dim {
            return Err(SimError::dimension_mismatch(
                "noise.samples rows",
                n_dim,
                self.samples.nrows(),
            ));
        }
        if self.samples.ncols() == 0 {
            return Err(SimError::invalid_config(
                "noise matrix needs at least one column",
            ));
        }
        if self.start_column >= self.samples.ncols() {
            return Err(SimError::invalid_config(format!(
                "noise start column {} out of range for {} columns",
                self.start_column,
                self.samples.ncols()
            )));
        }
        Ok(())
    }
}

/// Complete configuration for one trial.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationConfig {
    /// Duration of one step (seconds).
    pub loop_time: f64,
    /// Target and acquisition rules.
    pub trial: TrialConfig,
    /// Cursor plant.
    pub plant: PlantConfig,
    /// Internal forward model.
    pub forward_model: ForwardModelConfig,
    /// Control law.
    pub control: ControlConfig,
    /// Control noise.
    pub noise: NoiseConfig,
}

impl SimulationConfig {
    /// Create a configuration with a silent noise source and default control.
    #[must_use]
    pub fn new(loop_time: f64, plant: PlantConfig, trial: TrialConfig) -> Self {
        let noise = NoiseConfig::silent(plant.n_dim);
        Self {
            loop_time,
            trial,
            plant,
            forward_model: ForwardModelConfig::new(0, 1),
            control: ControlConfig::default(),
            noise,
        }
    }

    /// Set the forward model.
    #[must_use]
    pub fn forward_model(mut self, forward_model: ForwardModelConfig) -> Self {
        self.forward_model = forward_model;
        self
    }

    /// Set the control law.
    #[must_use]
    pub fn control(mut self, control: ControlConfig) -> Self {
        self.control = control;
        self
    }

    /// Set the noise source.
    #[must_use]
    pub fn noise(mut self, noise: NoiseConfig) -> Self {
        self.noise = noise;
        self
    }

    /// Number of dimensions.
    #[must_use]
    pub fn n_dim(&self) -> usize {
        self.plant.n_dim
    }

    /// Upper bound on simulated steps: `ceil(max_trial_time / loop_time)`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn step_budget(&self) -> usize {
        // Validated: both positive and finite.
        (self.trial.max_trial_time / self.loop_time).ceil() as usize
    }

    /// Buffer columns needed for a trial warm-started with `history_len` columns.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the column count overflows `usize`.
    pub fn capacity(&self, history_len: usize) -> Result<usize> {
        history_len.checked_add(self.step_budget()).ok_or_else(|| {
            SimError::invalid_config(format!(
                "{history_len} history columns plus {} steps overflow the buffer size",
                self.step_budget()
            ))
        })
    }

    /// Deadzone radius for this trial.
    #[must_use]
    pub fn deadzone_radius(&self) -> f64 {
        self.control.deadzone.resolve(&self.trial)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.loop_time.is_finite() || self.loop_time <= 0.0 {
            return Err(SimError::InvalidTimestep(self.loop_time));
        }

        self.plant.validate()?;
        let n_dim = self.plant.n_dim;
        self.trial.validate(n_dim)?;

        let steps = (self.trial.max_trial_time / self.loop_time).ceil();
        if !steps.is_finite() || steps > MAX_STEP_BUDGET as f64 {
            return Err(SimError::invalid_config(format!(
                "max trial time {} at loop time {} needs more than {MAX_STEP_BUDGET} steps",
                self.trial.max_trial_time, self.loop_time
            )));
        }
        self.control.validate()?;
        self.noise.validate(n_dim)?;

        Ok(())
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

    fn config_2d() -> SimulationConfig {
        SimulationConfig::new(
            0.02,
            PlantConfig::new(2),
            TrialConfig::new(DVector::from_vec(vec![1.0, 0.0])),
        )
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = config_2d();
        assert!(config.validate().is_ok());
        assert_eq!(config.n_dim(), 2);
        assert_eq!(config.noise.columns(), 1);
    }

    #[test]
    fn test_capacity() {
        let mut config = config_2d();
        config.loop_time = 0.25;
        config.trial.max_trial_time = 2.0;
        assert_eq!(config.step_budget(), 8);
        assert_eq!(config.capacity(3).unwrap(), 11);

        config.trial.max_trial_time = 2.1;
        assert_eq!(config.step_budget(), 9);
    }

    #[test]
    fn test_step_budget_bounded() {
        let mut config = config_2d();
        config.loop_time = 1e-300;
        config.trial.max_trial_time = f64::MAX;
        assert!(config.validate().unwrap_err().is_config_error());

        config.trial.max_trial_time = 1e-280;
        assert!(matches!(
            config.validate(),
            Err(SimError::InvalidConfig { .. })
        ));

        config.loop_time = 1.0;
        config.trial.max_trial_time = MAX_STEP_BUDGET as f64;
        assert!(config.validate().is_ok());
        assert!(config.capacity(usize::MAX).unwrap_err().is_config_error());
    }

    #[test]
    fn test_invalid_loop_time() {
        let mut config = config_2d();
        config.loop_time = 0.0;
        assert_eq!(
            config.validate().unwrap_err(),
            SimError::InvalidTimestep(0.0)
        );

        config.loop_time = f64::NAN;
        assert!(config.validate().unwrap_err().is_config_error());
    }

    #[test]
    fn test_target_dimension_mismatch() {
        let mut config = config_2d();
        config.trial.target = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let err = config.validate().unwrap_err();
        assert_eq!(err, SimError::dimension_mismatch("trial.target", 2, 3));
    }

    #[test]
    fn test_noise_validation() {
        let config = config_2d().noise(NoiseConfig::new(
            PiecewiseLinear::constant(1.0),
            DMatrix::zeros(3, 10),
        ));
        assert!(matches!(
            config.validate(),
            Err(SimError::DimensionMismatch { .. })
        ));

        let config = config_2d().noise(
            NoiseConfig::new(PiecewiseLinear::constant(1.0), DMatrix::zeros(2, 10)).start_at(10),
        );
        assert!(config.validate().unwrap_err().is_config_error());

        let config = config_2d().noise(NoiseConfig::new(
            PiecewiseLinear::constant(1.0),
            DMatrix::zeros(2, 0),
        ));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_trial_validation() {
        let trial = TrialConfig::new(DVector::zeros(2));
        assert!(trial.validate(2).is_ok());
        assert!(trial.clone().radius(-1.0).validate(2).is_err());
        assert!(trial.clone().timeout(0.0).validate(2).is_err());
        assert!(trial.dwell(f64::INFINITY).validate(2).is_err());
    }

    #[test]
    fn test_deadzone() {
        let trial = TrialConfig::new(DVector::zeros(1)).radius(0.3);
        assert_eq!(Deadzone::from_legacy(-1.0), Deadzone::TargetRadius);
        assert_eq!(Deadzone::from_legacy(0.1), Deadzone::Radius(0.1));
        assert_relative_eq!(Deadzone::TargetRadius.resolve(&trial), 0.3);
        assert_relative_eq!(Deadzone::Radius(0.1).resolve(&trial), 0.1);
    }

    #[test]
    fn test_forward_model() {
        let fm = ForwardModelConfig::compensating(3);
        assert_eq!(fm.forward_steps, 4);
        assert_eq!(fm.lookback(), 4);
        assert!(!fm.overshoots_history());
        assert!(ForwardModelConfig::new(0, 2).overshoots_history());
    }
}
