mod common;

use common::MockBoard;
use std::time::Duration;
use trimcal_core::report::MemoryReport;
use trimcal_core::retry::RetryPolicy;
use trimcal_core::sampler::Sampler;
use trimcal_core::threshold::calibrate_threshold;
use trimcal_core::{Baseline, CalibCfg};
use trimcal_traits::MonitorMode;
use trimcal_traits::clock::test_clock::TestClock;

// ~40 mV, low enough that a 15 % shortfall stays above the baseline
const LOW_BASELINE: Baseline = Baseline {
    median: 164.0,
    rms: 0.0,
};

fn run(
    script: &[f32],
) -> (
    trimcal_core::threshold::ThresholdOutcome,
    TestClock,
    MemoryReport,
) {
    let clock = TestClock::new();
    let board = MockBoard::flat(164).with_script(script);
    let mut sampler = Sampler::new(board, clock.clone(), RetryPolicy::default());
    let report = MemoryReport::new();
    let cfg = CalibCfg::default();
    let out = calibrate_threshold(&mut sampler, 0, LOW_BASELINE, &cfg, &report, "B/unit0")
        .expect("fit succeeds");
    (out, clock, report)
}

fn count(sleeps: &[Duration], ms: u64) -> usize {
    sleeps
        .iter()
        .filter(|&&d| d == Duration::from_millis(ms))
        .count()
}

#[test]
fn accepts_on_third_attempt_after_two_shortfalls() {
    let (out, clock, report) = run(&[0.85, 0.85]);
    assert!(out.converged);
    assert!(!out.below_baseline);
    assert_eq!(out.attempts, 3);
    assert_eq!(out.dac, 91);
    assert!((out.fit.slope - 2.0).abs() < 1e-3);
    assert!((out.fit.intercept - 40.0).abs() < 1e-2);
    // one deviation pause per failed attempt
    assert_eq!(count(&clock.sleeps(), 40), 2);
    assert!(report.lines().is_empty());
}

#[test]
fn first_reading_on_target_needs_one_attempt() {
    let (out, clock, _) = run(&[]);
    assert!(out.converged);
    assert_eq!(out.attempts, 1);
    assert!(clock.sleeps().is_empty());
}

#[test]
fn persistent_shortfall_is_reported_without_a_trailing_pause() {
    let (out, clock, report) = run(&[0.85, 0.85, 0.85]);
    assert!(!out.converged);
    assert_eq!(out.attempts, 3);
    assert_eq!(count(&clock.sleeps(), 40), 2);
    assert!(report.contains("B/unit0", "did not converge"));
}

#[test]
fn readings_below_baseline_are_flagged() {
    let (out, clock, report) = run(&[0.5, 0.5, 0.5]);
    assert!(out.below_baseline);
    assert!(!out.converged);
    assert_eq!(count(&clock.sleeps(), 30), 3);
    assert!(report.contains("B/unit0", "threshold below baseline!"));
}

#[test]
fn recovery_after_a_below_baseline_reading() {
    let (out, _, report) = run(&[0.5]);
    assert!(out.converged);
    assert!(!out.below_baseline);
    assert_eq!(out.attempts, 2);
    assert!(report.lines().is_empty());
}

#[test]
fn every_attempt_resolves_the_dac_from_a_fresh_sweep() {
    let clock = TestClock::new();
    // gain drifts from 2.0 to 2.5 after the first verification read
    let mut board = MockBoard::flat(164).with_script(&[0.85]);
    board.gain_steps.push_back(2.5);
    let mut sampler = Sampler::new(board, clock.clone(), RetryPolicy::default());
    let report = MemoryReport::new();
    let cfg = CalibCfg::default();
    let out = calibrate_threshold(&mut sampler, 0, LOW_BASELINE, &cfg, &report, "B/unit0")
        .expect("fit succeeds");

    assert!(out.converged);
    assert_eq!(out.attempts, 2);
    // (221.3 - 40) / 2.5, not the first attempt's 91
    assert_eq!(out.dac, 73);
    assert!((out.fit.slope - 2.5).abs() < 1e-3);
    assert_eq!(count(&clock.sleeps(), 40), 1);

    let board = sampler.into_front_end();
    assert_eq!(board.dac, 73);
    // two rounds of seven sweep points plus one verification read
    assert_eq!(board.counts(MonitorMode::CommonThresholdDac).len(), 16);
    assert!(report.lines().is_empty());
}
