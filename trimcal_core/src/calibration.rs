//! Board-level orchestration.
//!
//! Units are calibrated one after another. A unit failing at any stage is
//! recorded and skipped; nothing here aborts the board.

use crate::baseline::{BaselineVerdict, profile_unit};
use crate::config::CalibCfg;
use crate::error::{CalibError, Result};
use crate::linear_region::analyze_channel;
use crate::report::{ReportSink, note};
use crate::sampler::Sampler;
use crate::stats::is_channel_healthy;
use crate::threshold::{calibrate_threshold, measure_mid_trim};
use crate::trim::{correction_increment, equalize_unit};
use crate::types::{BoardKind, CHANNELS_PER_UNIT, ChannelArray, ChannelState, UnitState};
use trimcal_traits::{Clock, FrontEnd};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    /// Hot, dead or unreadable channels reached the abandon limit.
    BadBaseline { bad_channels: usize },
    /// The DAC response could not be fitted.
    ThresholdFit,
    /// No unmasked channel could be read at mid trim.
    MidTrimUnreadable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    Calibrated,
    Abandoned(AbandonReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitResult {
    pub unit: usize,
    pub outcome: UnitOutcome,
    pub state: UnitState,
    pub channels: ChannelArray<ChannelState>,
    /// DAC steps added by the correction pass (0 when it did not run).
    pub correction: u16,
}

impl UnitResult {
    pub const fn is_calibrated(&self) -> bool {
        matches!(self.outcome, UnitOutcome::Calibrated)
    }

    /// Best trim per channel, as handed to the board configuration.
    pub fn trims(&self) -> ChannelArray<u8> {
        std::array::from_fn(|ch| self.channels[ch].best_trim)
    }

    /// Mask bit per channel (1 = masked).
    pub fn masks(&self) -> ChannelArray<u8> {
        std::array::from_fn(|ch| u8::from(self.channels[ch].masked))
    }

    pub fn masked_count(&self) -> usize {
        self.channels.iter().filter(|c| c.masked).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoardResult {
    pub address: String,
    pub kind: BoardKind,
    pub units: Vec<UnitResult>,
}

impl BoardResult {
    pub fn calibrated(&self) -> impl Iterator<Item = &UnitResult> {
        self.units.iter().filter(|u| u.is_calibrated())
    }
}

/// Drives the full calibration of one board.
pub struct Calibrator<F, C, R> {
    sampler: Sampler<F, C>,
    report: R,
    cfg: CalibCfg,
}

impl<F: FrontEnd, C: Clock + Clone, R: ReportSink> Calibrator<F, C, R> {
    pub fn new(front_end: F, clock: C, report: R, cfg: CalibCfg) -> Result<Self> {
        cfg.check()?;
        let sampler = Sampler::new(front_end, clock, cfg.retry.baseline);
        Ok(Self {
            sampler,
            report,
            cfg,
        })
    }

    pub fn into_parts(self) -> (F, R) {
        (self.sampler.into_front_end(), self.report)
    }

    /// Calibrate `units` of the board at `address`, in order.
    pub fn calibrate_board(&mut self, address: &str, units: &[usize]) -> Result<BoardResult> {
        if units.is_empty() {
            return Err(CalibError::NoUnits.into());
        }
        let span = tracing::info_span!("board", address);
        let _enter = span.enter();
        let results = units
            .iter()
            .map(|&unit| self.calibrate_unit(address, unit))
            .collect();
        Ok(BoardResult {
            address: address.to_string(),
            kind: self.cfg.kind,
            units: results,
        })
    }

    /// Calibrate a single unit; never fails, abandoned units are reported.
    pub fn calibrate_unit(&mut self, address: &str, unit: usize) -> UnitResult {
        let unit_id = format!("{address}/unit{unit}");
        let cfg = &self.cfg;
        let report: &dyn ReportSink = &self.report;
        let sampler = &mut self.sampler;
        tracing::info!(unit = %unit_id, "calibrating unit");

        let mut result = UnitResult {
            unit,
            outcome: UnitOutcome::Calibrated,
            state: UnitState::default(),
            channels: [ChannelState::default(); CHANNELS_PER_UNIT],
            correction: 0,
        };

        // Baseline
        let profile = profile_unit(sampler, unit, cfg, report, &unit_id);
        for (ch, state) in result.channels.iter_mut().enumerate() {
            state.baseline = profile.channels[ch];
            state.masked = profile.masks[ch];
        }
        if let BaselineVerdict::Broken { bad_channels } = profile.verdict {
            result.outcome = UnitOutcome::Abandoned(AbandonReason::BadBaseline { bad_channels });
            return result;
        }
        result.state.baseline = profile.unit;
        result.state.noisy = profile.noisy_unit;

        // Global threshold
        let threshold =
            match calibrate_threshold(sampler, unit, profile.unit, cfg, report, &unit_id) {
                Ok(t) => t,
                Err(e) => {
                    note(report, &unit_id, format_args!("threshold fit failed: {e}"));
                    result.outcome = UnitOutcome::Abandoned(AbandonReason::ThresholdFit);
                    return result;
                }
            };
        result.state.dac_fit = threshold.fit;
        result.state.target_mv = threshold.target_mv;
        result.state.below_baseline = threshold.below_baseline;

        let Some(mid) = measure_mid_trim(
            sampler,
            unit,
            &threshold,
            &profile.masks,
            profile.unit,
            cfg,
            report,
            &unit_id,
        ) else {
            note(report, &unit_id, "no channel readable at mid trim");
            result.state.dac = threshold.dac;
            result.outcome = UnitOutcome::Abandoned(AbandonReason::MidTrimUnreadable);
            return result;
        };
        result.state.dac = mid.dac;
        result.state.mid_trim_median = mid.median;
        result.state.mid_eff = mid.eff;

        // Trim response
        let mut bad_trim = 0;
        let mut short_trim = 0;
        for (ch, state) in result.channels.iter_mut().enumerate() {
            let healthy = is_channel_healthy(
                state.baseline.median,
                state.baseline.rms,
                profile.unit.median,
                cfg.quality.cutoffs,
                cfg.kind,
            );
            if state.masked {
                continue;
            }
            if !healthy {
                // no slope: equalization applies and verifies the fallback trim
                bad_trim += 1;
                continue;
            }
            match analyze_channel(
                sampler,
                unit,
                ch,
                result.state.dac,
                state.baseline.median,
                result.state.noisy,
                cfg,
            ) {
                Ok(found) => {
                    state.slope = found.slope;
                    state.trim_max = found.trim_hi_used;
                    if found.trim_hi_used <= cfg.trim.window.mid {
                        short_trim += 1;
                    }
                    if let Some(sweep) = found.sweep {
                        state.min_eff = sweep.min_eff;
                        state.mid_eff = sweep.mid_eff;
                        state.max_eff = sweep.max_eff;
                    }
                    if found.mid_below_baseline() {
                        result.state.base_above_threshold += 1;
                    }
                    if !found.usable {
                        bad_trim += 1;
                    } else if (state.min_eff..=state.max_eff).contains(&result.state.mid_eff) {
                        result.state.good_channels += 1;
                    } else {
                        tracing::debug!(unit = %unit_id, channel = ch, "channel can't be equalized");
                    }
                }
                Err(e) => {
                    bad_trim += 1;
                    state.skipped = true;
                    state.best_trim = cfg.trim.fallback_trim;
                    tracing::warn!(unit = %unit_id, channel = ch, error = %e, "trim response unavailable");
                }
            }
        }

        let q = &cfg.quality;
        if result.state.base_above_threshold > q.base_above_alarm {
            note(
                report,
                &unit_id,
                format_args!(
                    "{} channels with effective threshold below baseline at mid trim",
                    result.state.base_above_threshold
                ),
            );
        }
        if short_trim >= q.short_trim_alarm {
            note(
                report,
                &unit_id,
                format_args!("{short_trim}/64 trimmers with half of the operating range"),
            );
        }
        if bad_trim >= q.bad_trim_alarm {
            note(
                report,
                &unit_id,
                format_args!("{bad_trim}/64 channels without a usable trim slope"),
            );
        }

        // Equalization and the single correction pass
        let dac = result.state.dac;
        let mid_eff = result.state.mid_eff;
        equalize_unit(sampler, unit, dac, &mut result.channels, mid_eff, false, cfg);
        if let Some(plus) = correction_increment(&result.channels, result.state.dac_fit, cfg) {
            let raised = dac.saturating_add(plus).min(cfg.threshold.dac_max);
            result.correction = raised - dac;
            result.state.dac = raised;
            equalize_unit(sampler, unit, raised, &mut result.channels, mid_eff, true, cfg);
            note(
                report,
                &unit_id,
                format_args!("threshold raised by {} DAC to {raised}", result.correction),
            );
        }

        let masked = result.masked_count();
        if masked >= q.masked_alarm {
            note(report, &unit_id, format_args!("{masked} channels masked"));
        }
        tracing::info!(
            unit = %unit_id,
            dac = result.state.dac,
            good = result.state.good_channels,
            masked,
            "unit calibrated"
        );
        result
    }
}
