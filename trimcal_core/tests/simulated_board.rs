use rstest::rstest;
use trimcal_core::conversions::channel_rows;
use trimcal_core::{CalibCfg, Calibrator, MemoryReport};
use trimcal_hardware::{SimParams, SimulatedFrontEnd};
use trimcal_traits::clock::test_clock::TestClock;

fn run_board(params: SimParams, units: &[usize]) -> (trimcal_core::BoardResult, TestClock) {
    let clock = TestClock::new();
    let fe = SimulatedFrontEnd::new(params);
    let mut cal = Calibrator::new(fe, clock.clone(), MemoryReport::new(), CalibCfg::default())
        .expect("default policy is valid");
    let board = cal.calibrate_board("SIM", units).expect("units given");
    (board, clock)
}

#[rstest]
#[case::seed_42(42)]
#[case::seed_7(7)]
fn simulated_board_calibrates_and_equalizes(#[case] seed: u64) {
    let params = SimParams {
        seed,
        units: 2,
        hot_channels: vec![(0, 3)],
        dead_channels: vec![(1, 60)],
        ..SimParams::default()
    };
    let (board, _) = run_board(params, &[0, 1]);

    assert_eq!(board.units.len(), 2);
    assert_eq!(board.calibrated().count(), 2);
    assert!(board.units[0].channels[3].masked);
    assert!(board.units[1].channels[60].masked);

    for unit in &board.units {
        let target = unit.state.mid_eff;
        assert!(target >= 30.0, "unit {} mid eff {target}", unit.unit);
        for (ch, c) in unit.channels.iter().enumerate() {
            assert!(c.best_trim <= 31);
            if c.masked || c.skipped {
                continue;
            }
            assert!(
                (c.trimmed_eff - target).abs() < 30.0,
                "unit {} channel {ch}: {} vs {target}",
                unit.unit,
                c.trimmed_eff
            );
        }
    }
    assert_eq!(channel_rows(&board).len(), 128);
}

#[test]
fn transient_link_failures_are_retried() {
    let params = SimParams {
        units: 1,
        fail_every: 97,
        ..SimParams::default()
    };
    let (board, clock) = run_board(params, &[0]);
    assert!(board.units[0].is_calibrated());
    assert!(!clock.sleeps().is_empty());
}

#[test]
fn units_are_calibrated_in_the_given_order() {
    let params = SimParams {
        units: 8,
        ..SimParams::default()
    };
    let (board, _) = run_board(params, &[5, 2]);
    let order: Vec<usize> = board.units.iter().map(|u| u.unit).collect();
    assert_eq!(order, vec![5, 2]);
}
