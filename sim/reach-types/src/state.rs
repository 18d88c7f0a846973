//! Trajectory buffers for a trial.
//!
//! All trajectories are column-major matrices with one column per step:
//!
//! | buffer | rows | contents |
//! |--------|------|----------|
//! | true state | `2 * n_dim` | cursor position, then velocity |
//! | estimated state | `2 * n_dim` | forward-model prediction |
//! | clean control | `n_dim` | controller output before noise |
//! | decoded control | `n_dim` | control after noise injection |
//!
//! The first `history_len` columns are supplied by the caller as a
//! [`WarmStart`]; the engine appends one column per simulated step through
//! [`SimulationState::record`], which is the only place the capacity
//! invariant is enforced.

use nalgebra::{DMatrix, DVector, DVectorView};

use crate::{Result, SimError, SimulationConfig};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Caller-supplied history preceding the first simulated step.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WarmStart {
    /// True state history (`2 * n_dim` rows).
    pub true_state: DMatrix<f64>,
    /// Clean control history (`n_dim` rows).
    pub clean_control: DMatrix<f64>,
}

impl WarmStart {
    /// Create a warm start from state and control history.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the histories are empty or have
    /// different lengths.
    pub fn new(true_state: DMatrix<f64>, clean_control: DMatrix<f64>) -> Result<Self> {
        if true_state.ncols() == 0 {
            return Err(SimError::invalid_config(
                "warm start needs at least one history column",
            ));
        }
        if true_state.ncols() != clean_control.ncols() {
            return Err(SimError::dimension_mismatch(
                "warm_start.clean_control columns",
                true_state.ncols(),
                clean_control.ncols(),
            ));
        }
        Ok(Self {
            true_state,
            clean_control,
        })
    }

    /// A cursor resting at `position` for `history_len` steps with no control.
    #[must_use]
    pub fn at_rest(position: &DVector<f64>, history_len: usize) -> Self {
        let n_dim = position.len();
        let mut true_state = DMatrix::zeros(2 * n_dim, history_len);
        for mut column in true_state.column_iter_mut() {
            column.rows_mut(0, n_dim).copy_from(position);
        }
        Self {
            true_state,
            clean_control: DMatrix::zeros(n_dim, history_len),
        }
    }

    /// Number of history columns.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.true_state.ncols()
    }

    /// Validate against a configuration.
    pub fn validate(&self, config: &SimulationConfig) -> Result<()> {
        let n_dim = config.n_dim();
        let state_rows = config.plant.state_rows();
        let history_len = self.history_len();

        if self.true_state.nrows() != state_rows {
            return Err(SimError::dimension_mismatch(
                "warm_start.true_state rows",
                state_rows,
                self.true_state.nrows(),
            ));
        }
        if self.clean_control.nrows() != n_dim {
            return Err(SimError::dimension_mismatch(
                "warm_start.clean_control rows",
                n_dim,
                self.clean_control.nrows(),
            ));
        }
        if self.clean_control.ncols() != history_len {
            return Err(SimError::dimension_mismatch(
                "warm_start.clean_control columns",
                history_len,
                self.clean_control.ncols(),
            ));
        }
        if history_len == 0 {
            return Err(SimError::invalid_config(
                "warm start needs at least one history column",
            ));
        }
        if self.true_state.iter().any(|v| !v.is_finite()) {
            return Err(SimError::invalid_config(
                "warm start state history must be finite",
            ));
        }
        if self.clean_control.iter().any(|v| !v.is_finite()) {
            return Err(SimError::invalid_config(
                "warm start control history must be finite",
            ));
        }
        // The first step observes column `history_len - delay - 1`.
        if history_len <= config.forward_model.delay_steps {
            return Err(SimError::invalid_config(format!(
                "warm start has {history_len} columns but a delay of {} steps needs at least {}",
                config.forward_model.delay_steps,
                config.forward_model.lookback()
            )));
        }
        Ok(())
    }
}

/// How a trial ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TrialOutcome {
    /// The cursor satisfied the dwell requirement.
    TargetAcquired,
    /// The trial timed out.
    TimeExpired,
}

impl TrialOutcome {
    /// Whether the target was acquired.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::TargetAcquired)
    }
}

impl std::fmt::Display for TrialOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TargetAcquired => write!(f, "target acquired"),
            Self::TimeExpired => write!(f, "time expired"),
        }
    }
}

/// One simulated step, ready to be appended to the buffers.
#[derive(Debug, Clone, Copy)]
pub struct StepRecord<'a> {
    /// True state after the step (`2 * n_dim`).
    pub true_state: &'a DVector<f64>,
    /// Forward-model estimate used by the controller (`2 * n_dim`).
    pub estimated_state: &'a DVector<f64>,
    /// Controller output (`n_dim`).
    pub clean_control: &'a DVector<f64>,
    /// Control after noise (`n_dim`).
    pub decoded_control: &'a DVector<f64>,
}

/// Pre-sized trajectory buffers and the write cursor.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationState {
    n_dim: usize,
    history_len: usize,
    current_step: usize,
    true_state: DMatrix<f64>,
    estimated_state: DMatrix<f64>,
    clean_control: DMatrix<f64>,
    decoded_control: DMatrix<f64>,
}

impl SimulationState {
    /// Allocate buffers for `config` and seed them with `warm_start`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `warm_start` does not fit `config`.
    pub fn new(config: &SimulationConfig, warm_start: &WarmStart) -> Result<Self> {
        let mut state = Self {
            n_dim: 0,
            history_len: 0,
            current_step: 0,
            true_state: DMatrix::zeros(0, 0),
            estimated_state: DMatrix::zeros(0, 0),
            clean_control: DMatrix::zeros(0, 0),
            decoded_control: DMatrix::zeros(0, 0),
        };
        state.reset(config, warm_start)?;
        Ok(state)
    }

    /// Re-initialize for a new trial, reusing allocations when the shape allows.
    ///
    /// Every column past the warm start is zeroed and the write cursor is
    /// placed right after the history.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `warm_start` does not fit `config`.
    pub fn reset(&mut self, config: &SimulationConfig, warm_start: &WarmStart) -> Result<()> {
        warm_start.validate(config)?;

        let n_dim = config.n_dim();
        let history_len = warm_start.history_len();
        let capacity = config.capacity(history_len)?;

        reshape_zeroed(&mut self.true_state, 2 * n_dim, capacity);
        reshape_zeroed(&mut self.estimated_state, 2 * n_dim, capacity);
        reshape_zeroed(&mut self.clean_control, n_dim, capacity);
        reshape_zeroed(&mut self.decoded_control, n_dim, capacity);

        self.true_state
            .columns_mut(0, history_len)
            .copy_from(&warm_start.true_state);
        self.clean_control
            .columns_mut(0, history_len)
            .copy_from(&warm_start.clean_control);

        self.n_dim = n_dim;
        self.history_len = history_len;
        self.current_step = history_len;
        Ok(())
    }

    /// Number of spatial axes.
    #[must_use]
    pub fn n_dim(&self) -> usize {
        self.n_dim
    }

    /// Number of warm-start columns.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history_len
    }

    /// Column the next step will write.
    #[must_use]
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Total number of columns.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.true_state.ncols()
    }

    /// Number of steps simulated since the warm start.
    #[must_use]
    pub fn steps_simulated(&self) -> usize {
        self.current_step - self.history_len
    }

    /// True state column `step`.
    ///
    /// # Panics
    ///
    /// Panics if `step >= capacity`.
    #[must_use]
    pub fn true_column(&self, step: usize) -> DVectorView<'_, f64> {
        self.true_state.column(step)
    }

    /// Clean control column `step`.
    ///
    /// # Panics
    ///
    /// Panics if `step >= capacity`.
    #[must_use]
    pub fn clean_control_column(&self, step: usize) -> DVectorView<'_, f64> {
        self.clean_control.column(step)
    }

    /// True state trajectory.
    #[must_use]
    pub fn true_state(&self) -> &DMatrix<f64> {
        &self.true_state
    }

    /// Estimated state trajectory.
    #[must_use]
    pub fn estimated_state(&self) -> &DMatrix<f64> {
        &self.estimated_state
    }

    /// Clean control trajectory.
    #[must_use]
    pub fn clean_control(&self) -> &DMatrix<f64> {
        &self.clean_control
    }

    /// Decoded control trajectory.
    #[must_use]
    pub fn decoded_control(&self) -> &DMatrix<f64> {
        &self.decoded_control
    }

    /// Append one step at the current column and advance.
    ///
    /// Returns the column that was written.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::CapacityExceeded`] if the buffers are full, and a
    /// dimension mismatch if a vector has the wrong length.
    pub fn record(&mut self, step: StepRecord<'_>) -> Result<usize> {
        let column = self.current_step;
        if column >= self.capacity() {
            return Err(SimError::CapacityExceeded {
                step: column,
                capacity: self.capacity(),
            });
        }

        let state_rows = 2 * self.n_dim;
        check_len("step.true_state", state_rows, step.true_state.len())?;
        check_len("step.estimated_state", state_rows, step.estimated_state.len())?;
        check_len("step.clean_control", self.n_dim, step.clean_control.len())?;
        check_len("step.decoded_control", self.n_dim, step.decoded_control.len())?;

        self.true_state.set_column(column, step.true_state);
        self.estimated_state.set_column(column, step.estimated_state);
        self.clean_control.set_column(column, step.clean_control);
        self.decoded_control.set_column(column, step.decoded_control);

        self.current_step += 1;
        Ok(column)
    }

    /// Hand the buffers to the caller.
    #[must_use]
    pub fn into_result(
        self,
        outcome: TrialOutcome,
        dwell_time: f64,
        next_noise_column: usize,
    ) -> TrialResult {
        TrialResult {
            true_state: self.true_state,
            estimated_state: self.estimated_state,
            clean_control: self.clean_control,
            decoded_control: self.decoded_control,
            final_step: self.current_step,
            history_len: self.history_len,
            outcome,
            dwell_time,
            next_noise_column,
        }
    }
}

/// Trajectories and summary of a finished trial.
///
/// Columns at or beyond `final_step` were never written and are zero.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrialResult {
    /// True state trajectory (`2 * n_dim` × capacity).
    pub true_state: DMatrix<f64>,
    /// Forward-model estimates (`2 * n_dim` × capacity).
    pub estimated_state: DMatrix<f64>,
    /// Controller output (`n_dim` × capacity).
    pub clean_control: DMatrix<f64>,
    /// Control after noise (`n_dim` × capacity).
    pub decoded_control: DMatrix<f64>,
    /// One past the last written column.
    pub final_step: usize,
    /// Number of warm-start columns.
    pub history_len: usize,
    /// How the trial ended.
    pub outcome: TrialOutcome,
    /// Dwell time accumulated when the trial ended (seconds).
    pub dwell_time: f64,
    /// Noise column a follow-up trial should start from.
    pub next_noise_column: usize,
}

impl TrialResult {
    /// Number of simulated steps.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.final_step - self.history_len
    }

    /// Number of buffer columns.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.true_state.ncols()
    }

    /// Number of spatial axes.
    #[must_use]
    pub fn n_dim(&self) -> usize {
        self.clean_control.nrows()
    }

    /// Cursor position at column `step`.
    #[must_use]
    pub fn position(&self, step: usize) -> DVector<f64> {
        self.true_state.column(step).rows(0, self.n_dim()).into_owned()
    }

    /// Cursor velocity at column `step`.
    #[must_use]
    pub fn velocity(&self, step: usize) -> DVector<f64> {
        let n_dim = self.n_dim();
        self.true_state.column(step).rows(n_dim, n_dim).into_owned()
    }

    /// Final cursor position.
    #[must_use]
    pub fn final_position(&self) -> DVector<f64> {
        self.position(self.final_step - 1)
    }
}

fn reshape_zeroed(matrix: &mut DMatrix<f64>, rows: usize, cols: usize) {
    if matrix.shape() == (rows, cols) {
        matrix.fill(0.0);
    } else {
        *matrix = DMatrix::zeros(rows, cols);
    }
}

fn check_len(field: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(SimError::dimension_mismatch(field, expected, actual))
    }
}
