//! End-to-end reaching trials.
//!
//! These tests drive the public API only:
//! - Acquisition and timeout bookkeeping
//! - Noise cycling and chaining across trials
//! - Reaction time and the two dwell rules
//! - Delayed 2-D reaching with a compensating forward model
//! - Nonlinear plants and legacy code mapping

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector};
use reach_core::{
    ControlConfig, Deadzone, Extrapolation, ForwardModelConfig, NoiseConfig, Nonlinearity,
    PiecewiseLinear, PlantConfig, SimError, SimulationConfig, Simulator, TrialConfig,
    TrialOutcome, WarmStart,
};

fn line(target: f64) -> TrialConfig {
    TrialConfig::new(DVector::from_vec(vec![target]))
}

fn rest_1d(position: f64, history_len: usize) -> WarmStart {
    WarmStart::at_rest(&DVector::from_vec(vec![position]), history_len)
}

/// Plant with no velocity memory: each step moves by `dt * decoded`.
fn direct_plant() -> PlantConfig {
    PlantConfig::new(1).smoothing(0.0, 1.0)
}

/// Open loop: the cursor is driven by the noise samples alone.
fn open_loop(samples: DMatrix<f64>) -> (ControlConfig, NoiseConfig) {
    (
        ControlConfig::new(PiecewiseLinear::zero(), PiecewiseLinear::zero()),
        NoiseConfig::new(PiecewiseLinear::constant(1.0), samples),
    )
}

// ============================================================================
// Acquisition and timeout
// ============================================================================

#[test]
fn test_start_inside_with_zero_dwell_acquires_on_first_step() {
    let trial = line(0.0).radius(0.5).dwell(0.0);
    let config = SimulationConfig::new(0.1, PlantConfig::new(1), trial);
    let simulator = Simulator::new(config).unwrap();

    let result = simulator.run(&rest_1d(0.2, 2)).unwrap();
    assert_eq!(result.outcome, TrialOutcome::TargetAcquired);
    assert_eq!(result.steps(), 1);
    assert_eq!(result.final_step, 3);
}

#[test]
fn test_unreachable_target_times_out_at_budget() {
    let trial = line(100.0).radius(0.0).dwell(0.0).timeout(2.0);
    let config = SimulationConfig::new(0.25, PlantConfig::new(1), trial)
        .forward_model(ForwardModelConfig::compensating(2));
    let simulator = Simulator::new(config).unwrap();

    let result = simulator.run(&rest_1d(0.0, 3)).unwrap();
    assert_eq!(result.outcome, TrialOutcome::TimeExpired);
    assert!(!result.outcome.is_success());
    assert_eq!(result.steps(), 8);
    assert_eq!(result.final_step, 3 + 8);
    assert_eq!(result.capacity(), result.final_step);
}

#[test]
fn test_columns_past_final_step_stay_zero() {
    let trial = line(0.0).radius(0.5).dwell(0.0);
    let config = SimulationConfig::new(0.1, PlantConfig::new(1), trial);
    let simulator = Simulator::new(config).unwrap();

    let result = simulator.run(&rest_1d(0.2, 1)).unwrap();
    assert!(result.capacity() > result.final_step);
    for k in result.final_step..result.capacity() {
        assert_eq!(result.true_state[(0, k)], 0.0);
        assert_eq!(result.estimated_state[(0, k)], 0.0);
        assert_eq!(result.decoded_control[(0, k)], 0.0);
    }
}

#[test]
fn test_one_dimensional_reach() {
    let trial = line(10.0).radius(1.0).dwell(0.0).timeout(100.0);
    let config = SimulationConfig::new(0.1, PlantConfig::new(1).smoothing(0.9, 1.0), trial)
        .forward_model(ForwardModelConfig::new(0, 1))
        .control(ControlConfig::new(
            PiecewiseLinear::constant(1.0),
            PiecewiseLinear::zero(),
        ))
        .noise(NoiseConfig::new(PiecewiseLinear::zero(), DMatrix::zeros(1, 8)));
    let simulator = Simulator::new(config).unwrap();

    let result = simulator.run(&rest_1d(0.0, 1)).unwrap();
    assert_eq!(result.outcome, TrialOutcome::TargetAcquired);

    for k in 1..result.final_step {
        assert!(
            result.true_state[(0, k)] >= result.true_state[(0, k - 1)],
            "cursor moved backward at column {k}"
        );
    }
    let distance = (result.final_position() - DVector::from_vec(vec![10.0])).norm();
    assert!(distance < 1.0);
}

// ============================================================================
// Noise
// ============================================================================

#[test]
fn test_noise_columns_cycle() {
    let samples = DMatrix::from_column_slice(2, 3, &[1.0, -1.0, 2.0, -2.0, 3.0, -3.0]);
    let (control, noise) = open_loop(samples.clone());
    let trial = TrialConfig::new(DVector::from_vec(vec![50.0, 50.0]))
        .radius(0.0)
        .timeout(2.0);
    let config = SimulationConfig::new(0.25, PlantConfig::new(2), trial)
        .control(control)
        .noise(noise);
    let simulator = Simulator::new(config).unwrap();

    let result = simulator.run(&WarmStart::at_rest(&DVector::zeros(2), 1)).unwrap();
    assert_eq!(result.steps(), 8);
    for k in 0..result.steps() {
        let column = result.decoded_control.column(1 + k);
        assert_eq!(column, samples.column(k % 3));
    }
    assert_eq!(result.next_noise_column, 8 % 3);
}

#[test]
fn test_chained_trials_continue_noise() {
    let samples = DMatrix::from_row_slice(1, 5, &[0.1, 0.2, 0.3, 0.4, 0.5]);
    let (control, noise) = open_loop(samples);
    let trial = line(50.0).radius(0.0).timeout(0.75);
    let config = SimulationConfig::new(0.25, direct_plant(), trial)
        .control(control)
        .noise(noise);
    let simulator = Simulator::new(config).unwrap();
    let warm = rest_1d(0.0, 1);

    let first = simulator.run(&warm).unwrap();
    assert_eq!(first.steps(), 3);
    assert_eq!(first.next_noise_column, 3);

    let second = simulator
        .run_with_noise_start(&warm, first.next_noise_column)
        .unwrap();
    assert_eq!(second.decoded_control[(0, 1)], 0.4);
    assert_eq!(second.decoded_control[(0, 2)], 0.5);
    assert_eq!(second.decoded_control[(0, 3)], 0.1);
    assert_eq!(second.next_noise_column, 1);
}

// ============================================================================
// Gating and dwell
// ============================================================================

#[test]
fn test_reaction_time_holds_command_at_zero() {
    let trial = line(10.0).radius(0.1).timeout(1.0);
    let noise = NoiseConfig::new(PiecewiseLinear::constant(1.0), DMatrix::zeros(1, 4));
    let config = SimulationConfig::new(0.1, PlantConfig::new(1), trial)
        .control(ControlConfig::default().reaction_time(4))
        .noise(noise);
    let simulator = Simulator::new(config).unwrap();

    let result = simulator.run(&rest_1d(0.0, 1)).unwrap();
    for k in 1..=4 {
        assert_eq!(result.clean_control[(0, k)], 0.0);
        assert_eq!(result.decoded_control[(0, k)], 0.0);
        assert_eq!(result.true_state[(0, k)], 0.0);
    }
    assert_eq!(result.decoded_control[(0, 5)], 1.0);
    assert!(result.true_state[(0, 5)] > 0.0);
}

#[test]
fn test_fixed_deadzone_overrides_target_radius() {
    let trial = line(1.0).radius(0.01).timeout(1.0);
    let config = SimulationConfig::new(0.1, PlantConfig::new(1), trial).control(
        ControlConfig::default().deadzone(Deadzone::from_legacy(2.0)),
    );
    let simulator = Simulator::new(config).unwrap();

    let result = simulator.run(&rest_1d(0.0, 1)).unwrap();
    assert_eq!(result.outcome, TrialOutcome::TimeExpired);
    assert_eq!(result.final_position()[0], 0.0);
}

/// Cursor path: 0 (inside), 1 (outside), 0 (inside), 0 (inside).
fn in_out_in(continuous_hold: bool) -> Simulator {
    let samples = DMatrix::from_row_slice(1, 4, &[0.0, 2.0, -2.0, 0.0]);
    let (control, noise) = open_loop(samples);
    let trial = line(0.0)
        .radius(0.6)
        .dwell(1.0)
        .timeout(10.0)
        .continuous_hold(continuous_hold);
    let config = SimulationConfig::new(0.5, direct_plant(), trial)
        .control(control)
        .noise(noise);
    Simulator::new(config).unwrap()
}

#[test]
fn test_continuous_hold_resets_on_exit() {
    let result = in_out_in(true).run(&rest_1d(0.0, 1)).unwrap();
    assert_eq!(result.outcome, TrialOutcome::TargetAcquired);
    assert_eq!(result.steps(), 4);
    assert_eq!(result.position(2)[0], 1.0);
    assert_relative_eq!(result.dwell_time, 1.0);
}

#[test]
fn test_cumulative_dwell_survives_exit() {
    let result = in_out_in(false).run(&rest_1d(0.0, 1)).unwrap();
    assert_eq!(result.outcome, TrialOutcome::TargetAcquired);
    assert_eq!(result.steps(), 3);
    assert_relative_eq!(result.dwell_time, 1.0);
}

// ============================================================================
// Delayed reaching
// ============================================================================

#[test]
fn test_delayed_two_dimensional_reach() {
    let target = DVector::from_vec(vec![0.3, -0.4]);
    let trial = TrialConfig::new(target.clone())
        .radius(0.02)
        .dwell(0.1)
        .timeout(5.0);
    let target_gain = PiecewiseLinear::from_knots(&[(0.0, 0.0), (0.1, 1.0)])
        .unwrap()
        .with_extrapolation(Extrapolation::Clamp);
    let control = ControlConfig::new(target_gain, PiecewiseLinear::zero())
        .deadzone(Deadzone::Radius(0.0));
    let config = SimulationConfig::new(0.01, PlantConfig::new(2), trial)
        .forward_model(ForwardModelConfig::compensating(3))
        .control(control)
        .noise(NoiseConfig::silent(2));
    let simulator = Simulator::new(config).unwrap();

    let result = simulator.run(&WarmStart::at_rest(&DVector::zeros(2), 4)).unwrap();
    assert_eq!(result.outcome, TrialOutcome::TargetAcquired);
    assert!((result.final_position() - &target).norm() < 0.02);

    // Early on the cursor heads straight for the target.
    let early = result.position(20);
    assert!(early.norm() > 0.0);
    assert_relative_eq!(early[0] / early[1], -0.75, epsilon = 1e-9);
}

#[test]
fn test_short_history_rejected() {
    let trial = line(1.0);
    let config = SimulationConfig::new(0.01, PlantConfig::new(1), trial)
        .forward_model(ForwardModelConfig::compensating(3));
    let simulator = Simulator::new(config).unwrap();

    let err = simulator.run(&rest_1d(0.0, 3)).unwrap_err();
    assert!(err.is_config_error());
    assert!(simulator.run(&rest_1d(0.0, 4)).is_ok());
}

// ============================================================================
// Plant nonlinearities
// ============================================================================

fn reach_with(nonlinearity: Nonlinearity) -> reach_core::TrialResult {
    let trial = line(5.0).radius(0.1).dwell(0.0).timeout(3.0);
    let plant = PlantConfig::new(1).nonlinearity(nonlinearity);
    let config = SimulationConfig::new(0.05, plant, trial);
    Simulator::new(config)
        .unwrap()
        .run(&rest_1d(0.0, 1))
        .unwrap()
}

#[test]
fn test_identity_curve_matches_linear_plant() {
    let identity = PiecewiseLinear::from_knots(&[(0.0, 0.0), (1.0, 1.0)]).unwrap();
    let linear = reach_with(Nonlinearity::Linear);
    let curved = reach_with(Nonlinearity::StaticCurve(identity));

    assert_eq!(linear.final_step, curved.final_step);
    for k in 0..linear.final_step {
        assert_relative_eq!(
            linear.true_state[(0, k)],
            curved.true_state[(0, k)],
            epsilon = 1e-9
        );
    }
}

#[test]
fn test_threshold_above_max_speed_freezes_cursor() {
    let result = reach_with(Nonlinearity::Threshold { threshold: 10.0 });
    assert_eq!(result.outcome, TrialOutcome::TimeExpired);
    for k in 0..result.final_step {
        assert_eq!(result.position(k)[0], 0.0);
    }
    // The command and the velocity filter are unaffected.
    assert!(result.velocity(result.final_step - 1)[0] > 0.0);
}

#[test]
fn test_power_law_slows_small_speeds() {
    let linear = reach_with(Nonlinearity::Linear);
    let power = reach_with(Nonlinearity::PowerLaw {
        exponent: 2.0,
        scale: 1.0,
    });
    // Speeds stay below 1, so squaring shrinks every displacement.
    assert!(power.position(10)[0] < linear.position(10)[0]);
    assert!(power.position(10)[0] > 0.0);
}

#[test]
fn test_legacy_codes_build_plants() {
    let curve = PiecewiseLinear::constant(0.5);
    for code in 0..=3 {
        let nonlinearity = Nonlinearity::from_code(code, 0.2, 1.0, curve.clone()).unwrap();
        assert_eq!(nonlinearity.code(), code);

        let plant = PlantConfig::new(1).nonlinearity(nonlinearity);
        let config = SimulationConfig::new(0.05, plant, line(1.0).timeout(0.5));
        let result = Simulator::new(config).unwrap().run(&rest_1d(0.0, 1));
        assert!(result.is_ok(), "code {code}");
    }

    let err = Nonlinearity::from_code(9, 0.0, 0.0, curve).unwrap_err();
    assert!(matches!(err, SimError::InvalidConfig { .. }));
}
