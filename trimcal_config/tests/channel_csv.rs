use std::fs::{self, File};
use std::io::Write;

use rstest::rstest;
use tempfile::tempdir;
use trimcal_config::{CHANNEL_CSV_HEADER, ChannelRow, load_channel_csv, write_channel_csv};

fn row(unit: usize, channel: usize, best_trim: u8, masked: u8) -> ChannelRow {
    ChannelRow {
        board: "MMFE8_L1P1_HOL".into(),
        unit,
        channel,
        baseline_mv: 160.2,
        baseline_rms_mv: 1.4,
        mid_eff: 48.0,
        slope: 8.1,
        unit_baseline_mv: 160.0,
        unit_rms_mv: 1.5,
        unit_mid_median: 700.0,
        unit_eff: 44.5,
        dac: 372,
        best_trim,
        trimmed_median: 699.0,
        trimmed_eff: 43.0,
        dac_slope: 2.02,
        dac_intercept: 39.5,
        masked,
    }
}

#[rstest]
fn header_is_written_first() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("channels.csv");
    write_channel_csv(&path, &[row(0, 0, 14, 0)]).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    let first = text.lines().next().unwrap();
    assert_eq!(first, CHANNEL_CSV_HEADER.join(","));
    assert!(text.lines().nth(1).unwrap().starts_with("MMFE8_L1P1_HOL,0,0,"));
}

#[rstest]
fn rows_read_back_in_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("channels.csv");
    let rows: Vec<ChannelRow> = (0..64).map(|ch| row(1, ch, 10, u8::from(ch == 7))).collect();
    write_channel_csv(&path, &rows).unwrap();
    let back = load_channel_csv(&path).unwrap();
    assert_eq!(back.len(), 64);
    assert_eq!(back[7].masked, 1);
    assert_eq!(back[63].channel, 63);
}

#[rstest]
fn empty_board_writes_only_the_header() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("channels.csv");
    write_channel_csv(&path, &[]).unwrap();
    assert!(load_channel_csv(&path).unwrap().is_empty());
}

#[rstest]
fn wrong_headers_are_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("channels.csv");
    let mut f = File::create(&path).unwrap();
    writeln!(f, "unit,channel,trim").unwrap();
    writeln!(f, "0,0,14").unwrap();
    let err = load_channel_csv(&path).unwrap_err();
    assert!(format!("{err}").contains("channel CSV must have headers"));
}

#[rstest]
fn missing_directory_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nope").join("channels.csv");
    let err = write_channel_csv(&path, &[]).unwrap_err();
    assert!(format!("{err}").contains("create channel CSV"));
}
