//! Channel baselines, hot/dead/noisy classification and the pruned unit baseline.

use crate::config::CalibCfg;
use crate::report::{ReportSink, note};
use crate::sampler::{SampleRequest, Sampler};
use crate::stats::{mean, median, rms, to_mv};
use crate::types::{Baseline, CHANNELS_PER_UNIT, ChannelArray};
use trimcal_traits::{Clock, FrontEnd};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineVerdict {
    Usable,
    /// Too many hot, dead or unreadable channels; the unit is not calibrated.
    Broken { bad_channels: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BaselineProfile {
    pub channels: ChannelArray<Baseline>,
    /// Hot, dead or unreadable channels.
    pub masks: ChannelArray<bool>,
    /// Authoritative unit baseline (pruned); zero when the unit is broken.
    pub unit: Baseline,
    /// Median over every raw sample before pruning.
    pub provisional_median: f32,
    pub hot: usize,
    pub dead: usize,
    pub noisy: usize,
    pub unreadable: usize,
    /// Enough noisy channels that trim reads use more samples.
    pub noisy_unit: bool,
    pub verdict: BaselineVerdict,
}

impl BaselineProfile {
    #[inline]
    pub const fn bad_channels(&self) -> usize {
        self.hot + self.dead + self.unreadable
    }

    #[inline]
    pub const fn is_usable(&self) -> bool {
        matches!(self.verdict, BaselineVerdict::Usable)
    }
}

/// Sample every channel's analog baseline and summarise the unit.
pub fn profile_unit<F: FrontEnd, C: Clock + Clone>(
    sampler: &mut Sampler<F, C>,
    unit: usize,
    cfg: &CalibCfg,
    report: &dyn ReportSink,
    unit_id: &str,
) -> BaselineProfile {
    let count = cfg.sampling.n_samples * cfg.sampling.baseline_factor;
    let per_channel: Vec<Vec<u16>> = (0..CHANNELS_PER_UNIT)
        .map(|ch| sampler.acquire_with(SampleRequest::baseline(unit, ch, count), cfg.retry.baseline))
        .collect();

    let profile = summarize_unit(&per_channel, cfg);
    tracing::info!(
        unit = unit_id,
        median = profile.unit.median,
        rms = profile.unit.rms,
        hot = profile.hot,
        dead = profile.dead,
        noisy = profile.noisy,
        "baseline profiled"
    );

    if profile.noisy_unit {
        note(
            report,
            unit_id,
            format_args!(
                "{} channels with baseline RMS above {} mV, doubling trim sampling",
                profile.noisy, cfg.quality.cutoffs.rms_mv
            ),
        );
    }
    let bad = profile.bad_channels();
    if bad >= cfg.quality.bad_warn {
        tracing::warn!(unit = unit_id, bad, "many hot/dead channels");
    }
    if let BaselineVerdict::Broken { bad_channels } = profile.verdict {
        note(
            report,
            unit_id,
            format_args!("{bad_channels} hot/dead channels, unit abandoned"),
        );
    }
    profile
}

/// Classify channels and derive the pruned unit baseline from raw samples,
/// one vector per channel (an empty vector is an unreadable channel).
pub fn summarize_unit(per_channel: &[Vec<u16>], cfg: &CalibCfg) -> BaselineProfile {
    let kind = cfg.kind;
    let cutoffs = cfg.quality.cutoffs;
    let mut profile = BaselineProfile {
        channels: [Baseline::default(); CHANNELS_PER_UNIT],
        masks: [false; CHANNELS_PER_UNIT],
        unit: Baseline::default(),
        provisional_median: 0.0,
        hot: 0,
        dead: 0,
        noisy: 0,
        unreadable: 0,
        noisy_unit: false,
        verdict: BaselineVerdict::Usable,
    };

    let all: Vec<u16> = per_channel.iter().flatten().copied().collect();
    let Some(provisional) = median(&all) else {
        profile.unreadable = CHANNELS_PER_UNIT;
        profile.masks = [true; CHANNELS_PER_UNIT];
        profile.verdict = BaselineVerdict::Broken {
            bad_channels: CHANNELS_PER_UNIT,
        };
        return profile;
    };
    let provisional = f32::from(provisional);
    profile.provisional_median = provisional;

    for (ch, samples) in per_channel.iter().enumerate().take(CHANNELS_PER_UNIT) {
        let (Some(med), Some(avg)) = (median(samples), mean(samples)) else {
            profile.unreadable += 1;
            profile.masks[ch] = true;
            continue;
        };
        let b = Baseline {
            median: f32::from(med),
            rms: rms(samples, avg),
        };
        profile.channels[ch] = b;

        let offset_mv = to_mv(b.median - provisional, kind);
        if offset_mv > cutoffs.baseline_mv {
            profile.hot += 1;
            profile.masks[ch] = true;
            tracing::debug!(channel = ch, offset_mv, "hot channel");
        } else if offset_mv < -cutoffs.baseline_mv {
            profile.dead += 1;
            profile.masks[ch] = true;
            tracing::debug!(channel = ch, offset_mv, "dead channel");
        }
        if to_mv(b.rms, kind) > cutoffs.rms_mv {
            profile.noisy += 1;
        }
    }
    // Fewer vectors than channels: the rest were never read.
    if per_channel.len() < CHANNELS_PER_UNIT {
        for m in &mut profile.masks[per_channel.len()..] {
            *m = true;
        }
        profile.unreadable += CHANNELS_PER_UNIT - per_channel.len();
    }

    profile.noisy_unit = profile.noisy >= cfg.quality.noisy_unit;
    let bad = profile.bad_channels();
    if bad >= cfg.quality.bad_abandon {
        profile.verdict = BaselineVerdict::Broken { bad_channels: bad };
        return profile;
    }

    let pruned: Vec<u16> = per_channel
        .iter()
        .zip(profile.masks.iter())
        .filter(|(_, masked)| !**masked)
        .flat_map(|(samples, _)| samples.iter().copied())
        .filter(|&s| to_mv((f32::from(s) - provisional).abs(), kind) < cutoffs.rms_mv)
        .collect();
    match (median(&pruned), mean(&pruned)) {
        (Some(med), Some(avg)) => {
            profile.unit = Baseline {
                median: f32::from(med),
                rms: rms(&pruned, avg),
            };
        }
        _ => {
            profile.verdict = BaselineVerdict::Broken { bad_channels: bad };
        }
    }
    profile
}
