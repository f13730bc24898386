//! Trimmer equalization: best trim per channel, masking, and the single
//! unit-level threshold correction.

use crate::config::CalibCfg;
use crate::error::RecoverableError;
use crate::retry::retry_with_backoff;
use crate::sampler::{SampleRequest, Sampler};
use crate::stats::{clamp_trim, median, to_mv};
use crate::types::{ChannelArray, ChannelState, DacFit};
use trimcal_traits::{Clock, FrontEnd};

/// Trim expected to bring a channel `delta` counts above the unit target
/// down onto it. `slope` is the threshold drop per trim step.
///
/// Negligible or non-finite slopes fall back to `cfg.trim.fallback_trim`;
/// otherwise the guess is clamped to `[0, trim_max]`.
pub fn trim_guess(delta: f32, slope: f32, trim_max: u8, cfg: &CalibCfg) -> u8 {
    if !slope.is_finite() || slope.abs() < cfg.trim.negligible_slope || !delta.is_finite() {
        return cfg.trim.fallback_trim;
    }
    let steps = (delta / slope).round();
    // saturate before the integer conversion; clamp_trim bounds the rest
    let steps = steps.clamp(-1.0e6, 1.0e6) as i64;
    clamp_trim(i64::from(cfg.trim.window.mid) + steps, trim_max)
}

/// Measured outcome of applying a trim to one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimOutcome {
    pub best_trim: u8,
    pub trimmed_median: f32,
    pub trimmed_eff: f32,
    /// Deficit below baseline (counts), 0 when the threshold is above it.
    pub dac_to_add: f32,
    /// The deficit cannot be fixed by a unit-level raise; mask the channel.
    pub mask: bool,
}

/// Apply the best trim to one channel and verify its effective threshold.
///
/// On the recalculation pass (`recalc`) any remaining deficit masks the
/// channel; on the first pass only deficits above the cutoff do.
#[allow(clippy::too_many_arguments)]
pub fn equalize_channel<F: FrontEnd, C: Clock + Clone>(
    sampler: &mut Sampler<F, C>,
    unit: usize,
    channel: usize,
    dac: u16,
    state: &ChannelState,
    unit_mid_eff: f32,
    recalc: bool,
    cfg: &CalibCfg,
) -> Result<TrimOutcome, RecoverableError> {
    let delta = state.mid_eff - unit_mid_eff;
    let best_trim = trim_guess(delta, state.slope, state.trim_max, cfg);
    tracing::debug!(
        unit,
        channel,
        slope = state.slope,
        delta,
        best_trim,
        "trim target"
    );
    let clock = sampler.clock().clone();
    let samples = retry_with_backoff(cfg.retry.equalize, &clock, "equalize", |_| {
        sampler.try_acquire(SampleRequest::trimmed(
            unit,
            channel,
            best_trim,
            dac,
            cfg.sampling.n_samples,
        ))
    })?;
    let trimmed_median = f32::from(median(&samples).ok_or(RecoverableError::EmptyRead)?);
    let trimmed_eff = trimmed_median - state.baseline.median;

    let mut outcome = TrimOutcome {
        best_trim,
        trimmed_median,
        trimmed_eff,
        dac_to_add: 0.0,
        mask: false,
    };
    if trimmed_eff < 0.0 && !state.masked {
        outcome.dac_to_add = trimmed_eff.abs();
        outcome.mask = recalc || outcome.dac_to_add > cfg.trim.deficit_mask_cutoff;
        tracing::info!(
            unit,
            channel,
            trimmed_eff,
            masked = outcome.mask,
            "effective threshold below baseline"
        );
    }
    Ok(outcome)
}

/// Run `equalize_channel` over every unmasked, characterised channel and fold
/// the outcomes into `channels`. Returns how many channels failed to sample.
#[allow(clippy::too_many_arguments)]
pub fn equalize_unit<F: FrontEnd, C: Clock + Clone>(
    sampler: &mut Sampler<F, C>,
    unit: usize,
    dac: u16,
    channels: &mut ChannelArray<ChannelState>,
    unit_mid_eff: f32,
    recalc: bool,
    cfg: &CalibCfg,
) -> usize {
    let mut failed = 0;
    for (ch, state) in channels.iter_mut().enumerate() {
        if state.masked || state.skipped {
            continue;
        }
        match equalize_channel(sampler, unit, ch, dac, state, unit_mid_eff, recalc, cfg) {
            Ok(o) => {
                state.best_trim = o.best_trim;
                state.trimmed_median = o.trimmed_median;
                state.trimmed_eff = o.trimmed_eff;
                state.dac_to_add = o.dac_to_add;
                state.masked |= o.mask;
            }
            Err(e) => {
                failed += 1;
                tracing::warn!(unit, channel = ch, error = %e, "equalization failed");
            }
        }
        if recalc {
            sampler.pause(cfg.trim.recalc_pause);
        }
    }
    failed
}

/// DAC steps needed to lift the largest fixable deficit above baseline, or
/// `None` when no unmasked channel has a deficit within half the trimmer range.
pub fn correction_increment(
    channels: &ChannelArray<ChannelState>,
    fit: DacFit,
    cfg: &CalibCfg,
) -> Option<u16> {
    let limit_mv = cfg.trim.working_range_mv / 2.0;
    let worst = channels
        .iter()
        .filter(|c| !c.masked && c.dac_to_add > 0.0)
        .map(|c| c.dac_to_add)
        .filter(|&d| to_mv(d, cfg.kind) <= limit_mv)
        .fold(None, |acc: Option<f32>, d| Some(acc.map_or(d, |a| a.max(d))))?;
    if fit.slope <= 0.0 || !fit.slope.is_finite() {
        return None;
    }
    let steps = (worst / fit.slope).round() + 1.0;
    Some(steps.clamp(1.0, f32::from(cfg.threshold.dac_max)) as u16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::on_target(0.0, 4.0, 31, 14)]
    #[case::above_target(12.0, 4.0, 31, 17)]
    #[case::below_target(-20.0, 4.0, 31, 9)]
    #[case::clamped_high(400.0, 4.0, 25, 25)]
    #[case::clamped_low(-400.0, 4.0, 31, 0)]
    #[case::zero_slope(10.0, 0.0, 31, 7)]
    #[case::nan_slope(10.0, f32::NAN, 31, 7)]
    fn guesses(
        #[case] delta: f32,
        #[case] slope: f32,
        #[case] trim_max: u8,
        #[case] expected: u8,
    ) {
        assert_eq!(
            trim_guess(delta, slope, trim_max, &CalibCfg::default()),
            expected
        );
    }

    fn with_deficit(d: f32, masked: bool) -> ChannelState {
        ChannelState {
            dac_to_add: d,
            masked,
            ..ChannelState::default()
        }
    }

    #[test]
    fn correction_uses_largest_fixable_deficit() {
        let mut chs = [ChannelState::default(); 64];
        chs[1] = with_deficit(20.0, false);
        chs[2] = with_deficit(41.0, false);
        // 80 counts is ~19.5 mV, beyond half the trim range
        chs[3] = with_deficit(80.0, false);
        // masked channels are not candidates
        chs[4] = with_deficit(50.0, true);
        let fit = DacFit {
            slope: 2.0,
            intercept: 40.0,
        };
        // round(41 / 2) + 1
        assert_eq!(correction_increment(&chs, fit, &CalibCfg::default()), Some(22));
    }

    #[test]
    fn no_deficit_no_correction() {
        let chs = [ChannelState::default(); 64];
        let fit = DacFit {
            slope: 2.0,
            intercept: 0.0,
        };
        assert_eq!(correction_increment(&chs, fit, &CalibCfg::default()), None);
    }
}
