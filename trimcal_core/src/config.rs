//! Configuration types for the calibration engine.
//!
//! These are the runtime policy structs used by `Calibrator`. They are
//! separate from the TOML-deserialized config in `trimcal_config`; see
//! `conversions` for the bridge.

use crate::retry::RetryPolicy;
use crate::stats::{ADC_FULL_SCALE, ADC_RANGE_MV, HealthCutoffs};
use crate::types::{BoardKind, TrimWindow};
use std::time::Duration;

/// Sample counts per acquisition.
#[derive(Debug, Clone)]
pub struct SamplingCfg {
    /// Nominal samples per read.
    pub n_samples: usize,
    /// Multiplier for baseline and mid-trim unit reads.
    pub baseline_factor: usize,
    /// Multiplier for each DAC sweep point.
    pub sweep_factor: usize,
    /// Multiplier for trim-response reads on units flagged noisy.
    pub noisy_factor: usize,
}

impl Default for SamplingCfg {
    fn default() -> Self {
        Self {
            n_samples: 10,
            baseline_factor: 10,
            sweep_factor: 2,
            noisy_factor: 2,
        }
    }
}

/// Global threshold (DAC) calibration policy.
#[derive(Debug, Clone)]
pub struct ThresholdCfg {
    /// Target sits this many baseline RMS above the baseline.
    pub rms_factor: f32,
    /// Fixed margin added to the target (mV).
    pub offset_center_mv: f32,
    /// DAC settings swept for the gain fit.
    pub dac_sweep: Vec<u16>,
    /// Sweep samples further than this from their median are dropped (counts).
    pub sweep_margin: f32,
    /// Expected DAC gain in counts per DAC step; outside it only warns.
    pub gain_band: (f32, f32),
    /// Highest programmable DAC value.
    pub dac_max: u16,
    /// Verification passes when |measured - target| / target is below this.
    pub verify_tolerance: f32,
    pub verify_attempts: u32,
    /// Pause after a verification read that landed below the baseline.
    pub below_baseline_pause: Duration,
    /// Pause after a verification read outside tolerance.
    pub deviation_pause: Duration,
    /// Minimum unit effective threshold at mid trim (counts) before the DAC is raised.
    pub min_mid_eff: f32,
    /// Unit effective threshold outside `(low, high)` mV is reported.
    pub mid_eff_report_mv: (f32, f32),
}

impl Default for ThresholdCfg {
    fn default() -> Self {
        Self {
            rms_factor: 9.0,
            offset_center_mv: 14.0,
            dac_sweep: vec![100, 150, 200, 250, 300, 350, 400],
            sweep_margin: 50.0,
            gain_band: (1.8, 2.2),
            dac_max: 1023,
            verify_tolerance: 0.1,
            verify_attempts: 3,
            below_baseline_pause: Duration::from_millis(30),
            deviation_pause: Duration::from_millis(40),
            min_mid_eff: 30.0,
            mid_eff_report_mv: (5.0, 40.0),
        }
    }
}

/// Trim response search and equalization policy.
#[derive(Debug, Clone)]
pub struct TrimCfg {
    pub window: TrimWindow,
    /// Upper trim bound reduction per recursion.
    pub hi_step: u8,
    /// Segment slopes must differ by less than this (counts per trim step).
    pub slope_tolerance: f32,
    /// Slopes with smaller magnitude are treated as unusable.
    pub negligible_slope: f32,
    /// Trim used when the slope is unusable.
    pub fallback_trim: u8,
    /// Samples deviating more than this from the median are counted (counts).
    pub deviation_margin: f32,
    /// Deficits larger than this mask the channel on the first pass (counts).
    pub deficit_mask_cutoff: f32,
    /// Physical span of the trimmer (mV); corrections up to half of it are applied.
    pub working_range_mv: f32,
    /// Pause between channels during the recalculation pass.
    pub recalc_pause: Duration,
}

impl Default for TrimCfg {
    fn default() -> Self {
        Self {
            window: TrimWindow::NOMINAL,
            hi_step: 2,
            slope_tolerance: 1.0 / 1.5 / ADC_RANGE_MV * ADC_FULL_SCALE,
            negligible_slope: 1e-9,
            fallback_trim: TrimWindow::NOMINAL.mid - 7,
            deviation_margin: 50.0,
            deficit_mask_cutoff: 55.0,
            working_range_mv: 32.0,
            recalc_pause: Duration::from_millis(5),
        }
    }
}

/// Channel-count thresholds that grade a unit.
#[derive(Debug, Clone)]
pub struct QualityCfg {
    pub cutoffs: HealthCutoffs,
    /// This many noisy channels flag the unit as noisy.
    pub noisy_unit: usize,
    /// This many hot+dead channels logs a warning.
    pub bad_warn: usize,
    /// This many hot+dead channels abandons the unit.
    pub bad_abandon: usize,
    /// Reported when at least this many trimmers end at or below mid trim.
    pub short_trim_alarm: usize,
    /// Reported when at least this many channels have no usable slope.
    pub bad_trim_alarm: usize,
    /// Reported when at least this many channels end up masked.
    pub masked_alarm: usize,
    /// Reported when more than this many channels sit below baseline at mid trim.
    pub base_above_alarm: usize,
}

impl Default for QualityCfg {
    fn default() -> Self {
        Self {
            cutoffs: HealthCutoffs::default(),
            noisy_unit: 32,
            bad_warn: 16,
            bad_abandon: 32,
            short_trim_alarm: 8,
            bad_trim_alarm: 16,
            masked_alarm: 4,
            base_above_alarm: 1,
        }
    }
}

/// Retry budgets per stage.
#[derive(Debug, Clone)]
pub struct RetryCfg {
    pub baseline: RetryPolicy,
    pub linear_region: RetryPolicy,
    pub equalize: RetryPolicy,
}

impl Default for RetryCfg {
    fn default() -> Self {
        Self {
            baseline: RetryPolicy::new(5, 15),
            linear_region: RetryPolicy::new(5, 30),
            equalize: RetryPolicy::new(5, 40),
        }
    }
}

/// Complete calibration policy.
#[derive(Debug, Clone, Default)]
pub struct CalibCfg {
    pub kind: BoardKind,
    pub sampling: SamplingCfg,
    pub threshold: ThresholdCfg,
    pub trim: TrimCfg,
    pub quality: QualityCfg,
    pub retry: RetryCfg,
}

impl CalibCfg {
    /// Reject settings the algorithms cannot run with.
    pub fn check(&self) -> Result<(), crate::error::CalibError> {
        use crate::error::CalibError::Config;
        if self.sampling.n_samples == 0 {
            return Err(Config("sampling.n_samples must be >= 1".into()));
        }
        if self.threshold.dac_sweep.len() < 2 {
            return Err(Config("threshold.dac_sweep needs at least two points".into()));
        }
        if self.threshold.rms_factor.is_nan() || self.threshold.rms_factor <= 0.0 {
            return Err(Config("threshold.rms_factor must be > 0".into()));
        }
        if !self.trim.window.is_ordered() {
            return Err(Config("trim.window must satisfy hi > mid > lo".into()));
        }
        if self.trim.hi_step == 0 {
            return Err(Config("trim.hi_step must be >= 1".into()));
        }
        if self.quality.cutoffs.rms_mv <= 0.0 || self.quality.cutoffs.baseline_mv <= 0.0 {
            return Err(Config("quality cutoffs must be > 0".into()));
        }
        Ok(())
    }
}
