//! Global threshold (DAC) calibration for one unit.
//!
//! The DAC response is measured at a fixed sweep, fitted with a straight
//! line and inverted onto a target placed `rms_factor` baseline RMS above the
//! unit baseline plus a fixed margin. Sweep, fit and inversion repeat for
//! each of a bounded number of verification attempts. Afterwards the unit's effective threshold at nominal mid trim is
//! measured; it is the reference every channel is equalized to.

use crate::config::CalibCfg;
use crate::error::StatsError;
use crate::report::{ReportSink, note};
use crate::sampler::{SampleRequest, Sampler};
use crate::stats::{least_squares, mean, median, to_mv, to_raw};
use crate::types::{Baseline, CHANNELS_PER_UNIT, ChannelArray, DacFit};
use trimcal_traits::{Clock, FrontEnd};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdOutcome {
    pub dac: u16,
    pub fit: DacFit,
    pub target_mv: f32,
    /// Last verification reading (mV).
    pub measured_mv: f32,
    /// Verification attempts used.
    pub attempts: u32,
    /// Last reading was within tolerance of the target.
    pub converged: bool,
    /// Last reading was below the unit baseline.
    pub below_baseline: bool,
}

/// Target threshold in mV for a unit baseline.
pub fn target_mv(unit: Baseline, cfg: &CalibCfg) -> f32 {
    let t = &cfg.threshold;
    t.rms_factor * to_mv(unit.rms, cfg.kind) + to_mv(unit.median, cfg.kind) + t.offset_center_mv
}

/// Mean of the samples within `margin` counts of their median.
pub fn sweep_point(samples: &[u16], margin: f32) -> Option<f32> {
    let med = f32::from(median(samples)?);
    let kept: Vec<u16> = samples
        .iter()
        .copied()
        .filter(|&s| (f32::from(s) - med).abs() <= margin)
        .collect();
    mean(&kept)
}

/// Measure the DAC response and fit `counts = slope * dac + intercept`.
pub fn fit_dac_response<F: FrontEnd, C: Clock + Clone>(
    sampler: &mut Sampler<F, C>,
    unit: usize,
    cfg: &CalibCfg,
) -> Result<DacFit, StatsError> {
    let count = cfg.sampling.n_samples * cfg.sampling.sweep_factor;
    let points: Vec<(f32, f32)> = cfg
        .threshold
        .dac_sweep
        .iter()
        .filter_map(|&dac| {
            let samples = sampler.acquire_samples(SampleRequest::common_dac(unit, dac, count));
            let y = sweep_point(&samples, cfg.threshold.sweep_margin);
            tracing::debug!(unit, dac, mean = ?y, "dac sweep point");
            y.map(|y| (f32::from(dac), y))
        })
        .collect();
    let (slope, intercept) = least_squares(&points)?;
    Ok(DacFit { slope, intercept })
}

#[inline]
fn clamp_dac(value: f32, dac_max: u16) -> u16 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    value.round().min(f32::from(dac_max)) as u16
}

/// Sweep, fit and invert onto `target` mV.
fn solve_dac<F: FrontEnd, C: Clock + Clone>(
    sampler: &mut Sampler<F, C>,
    unit: usize,
    target: f32,
    cfg: &CalibCfg,
    unit_id: &str,
) -> Result<(DacFit, u16), StatsError> {
    let t = &cfg.threshold;
    let fit = fit_dac_response(sampler, unit, cfg)?;
    if fit.slope < t.gain_band.0 || fit.slope > t.gain_band.1 {
        tracing::warn!(
            unit = unit_id,
            slope = fit.slope,
            band = ?t.gain_band,
            "DAC gain outside expected band"
        );
    }
    let dac = clamp_dac(fit.invert(to_raw(target, cfg.kind)), t.dac_max);
    tracing::info!(
        unit = unit_id,
        target_mv = target,
        slope = fit.slope,
        intercept = fit.intercept,
        dac,
        "threshold DAC solved"
    );
    Ok((fit, dac))
}

/// Choose and verify the unit's global threshold DAC.
///
/// Every verification attempt re-measures the DAC response and solves again,
/// so a drifting front end can still converge. The fit of the last attempt
/// is returned.
pub fn calibrate_threshold<F: FrontEnd, C: Clock + Clone>(
    sampler: &mut Sampler<F, C>,
    unit: usize,
    baseline: Baseline,
    cfg: &CalibCfg,
    report: &dyn ReportSink,
    unit_id: &str,
) -> Result<ThresholdOutcome, StatsError> {
    let t = &cfg.threshold;
    let target = target_mv(baseline, cfg);
    let (fit, dac) = solve_dac(sampler, unit, target, cfg, unit_id)?;
    let mut outcome = ThresholdOutcome {
        dac,
        fit,
        target_mv: target,
        measured_mv: 0.0,
        attempts: 0,
        converged: false,
        below_baseline: false,
    };
    let attempts = t.verify_attempts.max(1);
    for attempt in 1..=attempts {
        outcome.attempts = attempt;
        if attempt > 1 {
            (outcome.fit, outcome.dac) = solve_dac(sampler, unit, target, cfg, unit_id)?;
        }
        let samples = sampler.acquire_samples(SampleRequest::common_dac(
            unit,
            outcome.dac,
            cfg.sampling.n_samples,
        ));
        let Some(avg) = mean(&samples) else {
            tracing::warn!(unit = unit_id, attempt, "no samples for threshold verification");
            sampler.pause(t.deviation_pause);
            continue;
        };
        outcome.measured_mv = to_mv(avg, cfg.kind);
        outcome.below_baseline = avg < baseline.median;
        if outcome.below_baseline {
            sampler.pause(t.below_baseline_pause);
            tracing::warn!(
                unit = unit_id,
                attempt,
                measured = avg,
                baseline = baseline.median,
                "threshold below baseline"
            );
            continue;
        }
        let deviation = (outcome.measured_mv - target).abs() / target;
        if deviation < t.verify_tolerance {
            outcome.converged = true;
            break;
        }
        tracing::warn!(
            unit = unit_id,
            attempt,
            deviation,
            measured_mv = outcome.measured_mv,
            target_mv = target,
            "threshold off target"
        );
        if attempt < attempts {
            sampler.pause(t.deviation_pause);
        }
    }

    if outcome.below_baseline {
        note(report, unit_id, "threshold below baseline!");
    } else if !outcome.converged {
        note(
            report,
            unit_id,
            format_args!(
                "threshold did not converge: {:.1} mV measured, {:.1} mV wanted (DAC {})",
                outcome.measured_mv, target, outcome.dac
            ),
        );
    }
    Ok(outcome)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MidTrimOutcome {
    /// DAC after any raise.
    pub dac: u16,
    /// DAC steps added because the effective threshold was too low.
    pub raised_by: u16,
    pub median: f32,
    /// `median` minus the unit baseline median.
    pub eff: f32,
}

fn sample_mid_trim<F: FrontEnd, C: Clock + Clone>(
    sampler: &mut Sampler<F, C>,
    unit: usize,
    dac: u16,
    masks: &ChannelArray<bool>,
    cfg: &CalibCfg,
) -> Option<f32> {
    let count = cfg.sampling.n_samples * cfg.sampling.baseline_factor;
    let mid = cfg.trim.window.mid;
    let mut all = Vec::with_capacity(count * CHANNELS_PER_UNIT);
    for ch in (0..CHANNELS_PER_UNIT).filter(|&ch| !masks[ch]) {
        all.extend(sampler.acquire_samples(SampleRequest::trimmed(unit, ch, mid, dac, count)));
    }
    median(&all).map(f32::from)
}

/// Unit effective threshold at nominal mid trim, raising the DAC once if it
/// sits too close to the baseline.
#[allow(clippy::too_many_arguments)]
pub fn measure_mid_trim<F: FrontEnd, C: Clock + Clone>(
    sampler: &mut Sampler<F, C>,
    unit: usize,
    threshold: &ThresholdOutcome,
    masks: &ChannelArray<bool>,
    baseline: Baseline,
    cfg: &CalibCfg,
    report: &dyn ReportSink,
    unit_id: &str,
) -> Option<MidTrimOutcome> {
    let t = &cfg.threshold;
    let mut dac = threshold.dac;
    let mut raised_by = 0;
    let mut med = sample_mid_trim(sampler, unit, dac, masks, cfg)?;
    let mut eff = med - baseline.median;
    if eff < t.min_mid_eff {
        let step = (baseline.rms / threshold.fit.slope).round().max(1.0);
        raised_by = clamp_dac(step, t.dac_max);
        dac = dac.saturating_add(raised_by).min(t.dac_max);
        tracing::info!(
            unit = unit_id,
            eff,
            raised_by,
            dac,
            "mid-trim effective threshold too low, raising DAC"
        );
        med = sample_mid_trim(sampler, unit, dac, masks, cfg)?;
        eff = med - baseline.median;
    }
    let eff_mv = to_mv(eff, cfg.kind);
    let (low, high) = t.mid_eff_report_mv;
    if eff_mv >= high || eff_mv <= low {
        note(
            report,
            unit_id,
            format_args!("effective threshold at mid trim is {eff_mv:.1} mV (DAC {dac})"),
        );
    }
    Some(MidTrimOutcome {
        dac,
        raised_by,
        median: med,
        eff,
    })
}
