use rstest::rstest;
use trimcal_hardware::{HwError, SimParams, SimulatedFrontEnd};
use trimcal_traits::{FrontEnd, MonitorMode};

fn median(mut v: Vec<u16>) -> u16 {
    v.sort_unstable();
    v[(v.len() - 1) / 2]
}

fn baseline_of(fe: &mut SimulatedFrontEnd, unit: usize, channel: usize) -> u16 {
    fe.configure_channel_monitor(unit, channel, MonitorMode::ChannelAnalog)
        .unwrap();
    median(fe.read_consecutive_samples(unit, 101).unwrap())
}

#[rstest]
#[case::hot(true, 200)]
#[case::dead(false, 200)]
fn injected_channels_shift_baseline(#[case] hot: bool, #[case] min_shift: i32) {
    let mut params = SimParams::default();
    if hot {
        params.hot_channels.push((0, 7));
    } else {
        params.dead_channels.push((0, 7));
    }
    let mut fe = SimulatedFrontEnd::new(params);
    let normal = i32::from(baseline_of(&mut fe, 0, 8));
    let flagged = i32::from(baseline_of(&mut fe, 0, 7));
    let shift = if hot { flagged - normal } else { normal - flagged };
    assert!(shift >= min_shift, "shift {shift} too small");
}

#[rstest]
#[case(1)]
#[case(3)]
fn fail_every_injects_link_errors(#[case] every: u64) {
    let mut fe = SimulatedFrontEnd::new(SimParams {
        fail_every: every,
        ..SimParams::default()
    });
    fe.configure_channel_monitor(0, 0, MonitorMode::ChannelAnalog)
        .unwrap();
    let failures = (0..6)
        .filter(|_| fe.read_consecutive_samples(0, 4).is_err())
        .count();
    assert_eq!(failures as u64, 6 / every);
}

#[test]
fn out_of_range_channel_is_typed_error() {
    let mut fe = SimulatedFrontEnd::new(SimParams::default());
    let err = fe
        .configure_channel_monitor(0, 64, MonitorMode::ChannelAnalog)
        .unwrap_err();
    let hw = err.downcast_ref::<HwError>().expect("HwError");
    assert!(matches!(hw, HwError::InvalidChannel { unit: 0, channel: 64 }));
}

#[test]
fn dac_output_follows_setting() {
    let mut fe = SimulatedFrontEnd::new(SimParams::default());
    fe.configure_channel_monitor(2, 0, MonitorMode::CommonThresholdDac)
        .unwrap();
    fe.configure_global_threshold(2, 100).unwrap();
    let low = median(fe.read_consecutive_samples(2, 41).unwrap());
    fe.configure_global_threshold(2, 400).unwrap();
    let high = median(fe.read_consecutive_samples(2, 41).unwrap());
    // ~2 counts per DAC step
    let gain = f32::from(high - low) / 300.0;
    assert!((1.8..=2.2).contains(&gain), "gain {gain}");
    assert_eq!(fe.global_threshold(2), Some(400));
}
