//! Numeric primitives shared by every calibration stage. No I/O.

use crate::error::StatsError;
use crate::types::{BoardKind, TrimWindow};

/// ADC full scale in counts.
pub const ADC_FULL_SCALE: f32 = 4095.0;
/// Monitor range in millivolts covered by `ADC_FULL_SCALE`.
pub const ADC_RANGE_MV: f32 = 1000.0;

/// Median of raw samples. Even lengths take the lower of the two middle values.
pub fn median(samples: &[u16]) -> Option<u16> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    Some(sorted[(sorted.len() - 1) / 2])
}

pub fn mean(samples: &[u16]) -> Option<f32> {
    if samples.is_empty() {
        return None;
    }
    let sum: f64 = samples.iter().map(|&s| f64::from(s)).sum();
    Some((sum / samples.len() as f64) as f32)
}

/// Population standard deviation around a caller-supplied mean.
/// Returns 0 for an empty slice.
pub fn rms(samples: &[u16], mean: f32) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let m = f64::from(mean);
    let sumsq: f64 = samples
        .iter()
        .map(|&s| {
            let d = f64::from(s) - m;
            d * d
        })
        .sum();
    (sumsq / samples.len() as f64).sqrt() as f32
}

/// Raw ADC counts to millivolts.
#[inline]
pub fn to_mv(raw: f32, kind: BoardKind) -> f32 {
    raw * ADC_RANGE_MV / ADC_FULL_SCALE * kind.resistor_factor()
}

/// Millivolts to raw ADC counts (inverse of `to_mv`, unrounded).
#[inline]
pub fn to_raw(mv: f32, kind: BoardKind) -> f32 {
    mv * ADC_FULL_SCALE / ADC_RANGE_MV / kind.resistor_factor()
}

/// Noise and baseline-offset cutoffs in millivolts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthCutoffs {
    pub rms_mv: f32,
    pub baseline_mv: f32,
}

impl Default for HealthCutoffs {
    fn default() -> Self {
        Self {
            rms_mv: 20.0,
            baseline_mv: 20.0,
        }
    }
}

/// False when the channel is noisier than the RMS cutoff or its baseline sits
/// further than the baseline cutoff from the unit's. Inputs are raw counts.
pub fn is_channel_healthy(
    median: f32,
    rms: f32,
    unit_median: f32,
    cutoffs: HealthCutoffs,
    kind: BoardKind,
) -> bool {
    if to_mv(rms, kind) > cutoffs.rms_mv {
        return false;
    }
    to_mv((median - unit_median).abs(), kind) <= cutoffs.baseline_mv
}

#[inline]
pub fn slopes_agree(m1: f32, m2: f32, tolerance: f32) -> bool {
    (m1 - m2).abs() < tolerance
}

/// Effective-threshold change per trim step over the two halves of a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentSlopes {
    pub low_mid: f32,
    pub mid_high: f32,
}

impl SegmentSlopes {
    #[inline]
    pub fn average(&self) -> f32 {
        (self.low_mid + self.mid_high) / 2.0
    }

    #[inline]
    pub fn agree(&self, tolerance: f32) -> bool {
        slopes_agree(self.low_mid, self.mid_high, tolerance)
    }
}

/// Δeffective/Δtrim over `lo→mid` and `mid→hi`. Refuses windows that are
/// not strictly ordered `hi > mid > lo`.
pub fn fit_two_segment_slope(
    eff_lo: f32,
    eff_mid: f32,
    eff_hi: f32,
    window: TrimWindow,
) -> Result<SegmentSlopes, StatsError> {
    if !window.is_ordered() {
        return Err(StatsError::InvalidTrimOrder {
            hi: window.hi,
            mid: window.mid,
            lo: window.lo,
        });
    }
    let lo = f32::from(window.lo);
    let mid = f32::from(window.mid);
    let hi = f32::from(window.hi);
    Ok(SegmentSlopes {
        low_mid: (eff_mid - eff_lo) / (mid - lo),
        mid_high: (eff_hi - eff_mid) / (hi - mid),
    })
}

/// Ordinary least squares `y = slope * x + intercept`, computed in f64.
pub fn least_squares(points: &[(f32, f32)]) -> Result<(f32, f32), StatsError> {
    if points.len() < 2 {
        return Err(StatsError::DegenerateFit("fewer than two points"));
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| f64::from(p.0)).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| f64::from(p.1)).sum::<f64>() / n;
    let mut sxx = 0.0f64;
    let mut sxy = 0.0f64;
    for &(x, y) in points {
        let dx = f64::from(x) - mean_x;
        sxx += dx * dx;
        sxy += dx * (f64::from(y) - mean_y);
    }
    if !sxx.is_finite() || sxx == 0.0 {
        return Err(StatsError::DegenerateFit("no variance in x"));
    }
    let slope = sxy / sxx;
    if !slope.is_finite() || slope == 0.0 {
        return Err(StatsError::DegenerateFit("zero or non-finite slope"));
    }
    Ok((slope as f32, (mean_y - slope * mean_x) as f32))
}

/// Clamp a signed trim guess into `[0, trim_max]`.
#[inline]
pub fn clamp_trim(guess: i64, trim_max: u8) -> u8 {
    guess.clamp(0, i64::from(trim_max)) as u8
}
