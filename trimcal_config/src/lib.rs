#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Run configuration and result files for the threshold/trim calibration.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - `ChannelRow` is the per-channel result record, written as CSV with a
//!   fixed header so downstream tooling can rely on the column order.
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Units on the largest supported board.
pub const MAX_UNITS: usize = 8;
/// Channels on one unit.
pub const CHANNELS_PER_UNIT: usize = 64;

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BoardKind {
    /// Monitor read directly by the ADC.
    #[default]
    Direct,
    /// Monitor read through the 1.5 resistor divider.
    Divided,
}

#[derive(Debug, Deserialize)]
pub struct BoardCfg {
    /// Board identifier; prefixes every report line and result row.
    pub address: String,
    #[serde(default = "default_units")]
    pub units: usize,
    /// Index of the first unit (6-unit boards start at 2).
    #[serde(default)]
    pub first_unit: usize,
    #[serde(default)]
    pub kind: BoardKind,
}

const fn default_units() -> usize {
    MAX_UNITS
}

impl BoardCfg {
    /// Unit indices to calibrate, in order.
    pub fn unit_indices(&self) -> Vec<usize> {
        (self.first_unit..self.first_unit.saturating_add(self.units)).collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Sampling {
    /// Nominal samples per read; baseline and sweep reads use multiples of it.
    pub n_samples: usize,
}

impl Default for Sampling {
    fn default() -> Self {
        Self { n_samples: 10 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Target threshold sits this many baseline RMS above the baseline.
    pub rms_factor: f32,
    /// Channels noisier than this (mV RMS) are unhealthy.
    pub rms_cutoff_mv: f32,
    /// Channels further than this from the unit baseline (mV) are hot or dead.
    pub baseline_cutoff_mv: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            rms_factor: 9.0,
            rms_cutoff_mv: 20.0,
            baseline_cutoff_mv: 20.0,
        }
    }
}

/// Parameters of the simulated front end used when no hardware is attached.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Simulation {
    pub seed: u64,
    /// Gaussian noise on every read (mV RMS).
    pub noise_mv: f32,
    /// `[unit, channel]` pairs with a baseline far above the unit.
    pub hot_channels: Vec<[usize; 2]>,
    /// `[unit, channel]` pairs with a baseline far below the unit.
    pub dead_channels: Vec<[usize; 2]>,
    /// `[unit, channel]` pairs with a very noisy baseline.
    pub noisy_channels: Vec<[usize; 2]>,
    /// Fail every Nth read with a link error (0 disables).
    pub fail_every: u64,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            seed: 42,
            noise_mv: 1.5,
            hot_channels: Vec::new(),
            dead_channels: Vec::new(),
            noisy_channels: Vec::new(),
            fail_every: 0,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Output {
    /// Directory for the channel CSV and the trims JSON.
    pub dir: Option<String>,
    /// Report file; lines are appended.
    pub report: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub board: BoardCfg,
    #[serde(default)]
    pub sampling: Sampling,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub simulation: Simulation,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub output: Output,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

fn positive(v: f32) -> bool {
    v.is_finite() && v > 0.0
}

fn check_channels(
    name: &str,
    list: &[[usize; 2]],
    seen: &mut HashSet<[usize; 2]>,
) -> eyre::Result<()> {
    for &[unit, channel] in list {
        if unit >= MAX_UNITS || channel >= CHANNELS_PER_UNIT {
            eyre::bail!("simulation.{name} entry [{unit}, {channel}] is out of range");
        }
        if !seen.insert([unit, channel]) {
            eyre::bail!("simulation.{name} entry [{unit}, {channel}] is listed twice");
        }
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Board
        if self.board.address.trim().is_empty() {
            eyre::bail!("board.address must not be empty");
        }
        if self.board.units == 0 {
            eyre::bail!("board.units must be >= 1");
        }
        let Some(last) = self.board.first_unit.checked_add(self.board.units) else {
            eyre::bail!("board.first_unit + board.units overflows");
        };
        if last > MAX_UNITS {
            eyre::bail!("board.first_unit + board.units must be <= {MAX_UNITS}, got {last}");
        }

        // Sampling
        if self.sampling.n_samples == 0 {
            eyre::bail!("sampling.n_samples must be >= 1");
        }

        // Thresholds
        if !positive(self.thresholds.rms_factor) {
            eyre::bail!("thresholds.rms_factor must be > 0");
        }
        if !positive(self.thresholds.rms_cutoff_mv) {
            eyre::bail!("thresholds.rms_cutoff_mv must be > 0");
        }
        if !positive(self.thresholds.baseline_cutoff_mv) {
            eyre::bail!("thresholds.baseline_cutoff_mv must be > 0");
        }

        // Simulation
        if !positive(self.simulation.noise_mv) {
            eyre::bail!("simulation.noise_mv must be > 0");
        }
        let mut seen = HashSet::new();
        check_channels("hot_channels", &self.simulation.hot_channels, &mut seen)?;
        check_channels("dead_channels", &self.simulation.dead_channels, &mut seen)?;
        check_channels("noisy_channels", &self.simulation.noisy_channels, &mut seen)?;

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot.to_ascii_lowercase().as_str(), "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly, got {rot:?}");
        }

        Ok(())
    }
}

/// Per-channel calibration record.
///
/// Header, in order:
/// board,unit,channel,baseline_mv,baseline_rms_mv,mid_eff,slope,
/// unit_baseline_mv,unit_rms_mv,unit_mid_median,unit_eff,dac,best_trim,
/// trimmed_median,trimmed_eff,dac_slope,dac_intercept,masked
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChannelRow {
    pub board: String,
    pub unit: usize,
    pub channel: usize,
    pub baseline_mv: f32,
    pub baseline_rms_mv: f32,
    /// Effective threshold at mid trim (counts).
    pub mid_eff: f32,
    /// Threshold drop per trim step (counts).
    pub slope: f32,
    pub unit_baseline_mv: f32,
    pub unit_rms_mv: f32,
    pub unit_mid_median: f32,
    pub unit_eff: f32,
    pub dac: u16,
    pub best_trim: u8,
    pub trimmed_median: f32,
    pub trimmed_eff: f32,
    pub dac_slope: f32,
    pub dac_intercept: f32,
    pub masked: u8,
}

pub const CHANNEL_CSV_HEADER: [&str; 18] = [
    "board",
    "unit",
    "channel",
    "baseline_mv",
    "baseline_rms_mv",
    "mid_eff",
    "slope",
    "unit_baseline_mv",
    "unit_rms_mv",
    "unit_mid_median",
    "unit_eff",
    "dac",
    "best_trim",
    "trimmed_median",
    "trimmed_eff",
    "dac_slope",
    "dac_intercept",
    "masked",
];

pub fn write_channel_csv(path: &Path, rows: &[ChannelRow]) -> eyre::Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| eyre::eyre!("create channel CSV {:?}: {}", path, e))?;
    wtr.write_record(CHANNEL_CSV_HEADER)
        .map_err(|e| eyre::eyre!("write CSV header {:?}: {}", path, e))?;
    for row in rows {
        wtr.serialize(row)
            .map_err(|e| eyre::eyre!("write CSV row {:?}: {}", path, e))?;
    }
    wtr.flush()
        .map_err(|e| eyre::eyre!("flush channel CSV {:?}: {}", path, e))?;
    Ok(())
}

pub fn load_channel_csv(path: &Path) -> eyre::Result<Vec<ChannelRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open channel CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<&str> = headers.iter().collect();
    if actual != CHANNEL_CSV_HEADER {
        eyre::bail!(
            "channel CSV must have headers '{}', got: {}",
            CHANNEL_CSV_HEADER.join(","),
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<ChannelRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }
    Ok(rows)
}
