//! Per-channel trim response over its linear region.
//!
//! The effective threshold (trimmed threshold minus the channel baseline) is
//! measured at the low, mid and high trim of a window. Raising the trim lowers
//! the threshold, so the low trim gives the largest effective threshold. If
//! the two segment slopes disagree the upper bound is lowered and the window
//! re-measured, until they agree or the window collapses.

use crate::config::CalibCfg;
use crate::error::RecoverableError;
use crate::retry::retry_with_backoff;
use crate::sampler::{SampleRequest, Sampler};
use crate::stats::{SegmentSlopes, fit_two_segment_slope, median};
use crate::types::TrimWindow;
use trimcal_traits::{Clock, FrontEnd};

/// Effective thresholds measured over one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimSweep {
    pub window: TrimWindow,
    /// At `window.lo`.
    pub max_eff: f32,
    /// At `window.mid`.
    pub mid_eff: f32,
    /// At `window.hi`.
    pub min_eff: f32,
}

/// Result of a linear-region search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlopeSearch {
    /// Threshold drop per trim step, averaged over both segments. 0 when unusable.
    pub slope: f32,
    /// Upper trim bound the search settled on.
    pub trim_hi_used: u8,
    pub usable: bool,
    /// Last window actually measured, if any.
    pub sweep: Option<TrimSweep>,
}

impl SlopeSearch {
    fn unusable(trim_hi: u8, sweep: Option<TrimSweep>) -> Self {
        Self {
            slope: 0.0,
            trim_hi_used: trim_hi,
            usable: false,
            sweep,
        }
    }

    /// Mid-trim effective threshold of the last measured window is negative.
    pub fn mid_below_baseline(&self) -> bool {
        self.sweep.is_some_and(|s| s.mid_eff < 0.0)
    }
}

/// Search for the linear region starting from `window`.
///
/// `measure(trim)` returns the effective threshold at that trim. The first
/// measurement error aborts the search and is returned as is.
pub fn search_linear_region<M>(
    window: TrimWindow,
    hi_step: u8,
    tolerance: f32,
    measure: &mut M,
) -> Result<SlopeSearch, RecoverableError>
where
    M: FnMut(u8) -> Result<f32, RecoverableError>,
{
    search(window, hi_step, tolerance, measure, None)
}

fn search<M>(
    window: TrimWindow,
    hi_step: u8,
    tolerance: f32,
    measure: &mut M,
    last: Option<TrimSweep>,
) -> Result<SlopeSearch, RecoverableError>
where
    M: FnMut(u8) -> Result<f32, RecoverableError>,
{
    if !window.is_ordered() || hi_step == 0 {
        return Ok(SlopeSearch::unusable(window.hi, last));
    }
    let sweep = TrimSweep {
        window,
        max_eff: measure(window.lo)?,
        mid_eff: measure(window.mid)?,
        min_eff: measure(window.hi)?,
    };
    let slopes: SegmentSlopes =
        match fit_two_segment_slope(sweep.max_eff, sweep.mid_eff, sweep.min_eff, window) {
            Ok(s) => s,
            Err(_) => return Ok(SlopeSearch::unusable(window.hi, Some(sweep))),
        };
    tracing::trace!(
        hi = window.hi,
        low_mid = slopes.low_mid,
        mid_high = slopes.mid_high,
        "segment slopes"
    );
    if !slopes.agree(tolerance) {
        return search(window.narrowed(hi_step), hi_step, tolerance, measure, Some(sweep));
    }
    Ok(SlopeSearch {
        slope: -slopes.average(),
        trim_hi_used: window.hi,
        usable: true,
        sweep: Some(sweep),
    })
}

/// Samples further than `margin` counts from `med`.
pub fn count_deviating(samples: &[u16], med: f32, margin: f32) -> usize {
    samples
        .iter()
        .filter(|&&s| (f32::from(s) - med).abs() > margin)
        .count()
}

/// Measure one channel's trim response against its own baseline, retrying
/// the whole search on hardware failure.
pub fn analyze_channel<F: FrontEnd, C: Clock + Clone>(
    sampler: &mut Sampler<F, C>,
    unit: usize,
    channel: usize,
    dac: u16,
    channel_baseline: f32,
    noisy_unit: bool,
    cfg: &CalibCfg,
) -> Result<SlopeSearch, RecoverableError> {
    let factor = if noisy_unit {
        cfg.sampling.noisy_factor
    } else {
        1
    };
    let count = cfg.sampling.n_samples * factor;
    let margin = cfg.trim.deviation_margin;
    let clock = sampler.clock().clone();
    let result = retry_with_backoff(cfg.retry.linear_region, &clock, "linear region", |_| {
        let mut measure = |trim: u8| -> Result<f32, RecoverableError> {
            let samples =
                sampler.try_acquire(SampleRequest::trimmed(unit, channel, trim, dac, count))?;
            let med = f32::from(median(&samples).ok_or(RecoverableError::EmptyRead)?);
            let deviating = count_deviating(&samples, med, margin);
            if deviating > 1 {
                tracing::warn!(unit, channel, trim, deviating, count, "samples strongly deviate");
            }
            Ok(med - channel_baseline)
        };
        search_linear_region(
            cfg.trim.window,
            cfg.trim.hi_step,
            cfg.trim.slope_tolerance,
            &mut measure,
        )
    });
    if let Ok(found) = &result {
        tracing::debug!(
            unit,
            channel,
            slope = found.slope,
            trim_max = found.trim_hi_used,
            usable = found.usable,
            "linear region"
        );
    }
    result
}
