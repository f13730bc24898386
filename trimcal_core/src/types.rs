//! Shared data model: board kinds, trim windows, per-channel and per-unit state.

/// Channels on one readout unit.
pub const CHANNELS_PER_UNIT: usize = 64;

/// Per-unit storage indexed by channel.
pub type ChannelArray<T> = [T; CHANNELS_PER_UNIT];

/// Monitor-line flavour of a board; decides the counts-to-millivolt factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoardKind {
    /// Monitor read directly by the ADC.
    #[default]
    Direct,
    /// Monitor read through a resistor divider (factor 1.5).
    Divided,
}

impl BoardKind {
    #[inline]
    pub const fn resistor_factor(self) -> f32 {
        match self {
            Self::Direct => 1.0,
            Self::Divided => 1.5,
        }
    }
}

/// Three trim settings a channel's response is measured at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimWindow {
    pub lo: u8,
    pub mid: u8,
    pub hi: u8,
}

impl TrimWindow {
    pub const NOMINAL: Self = Self {
        lo: 0,
        mid: 14,
        hi: 31,
    };

    #[inline]
    pub const fn is_ordered(&self) -> bool {
        self.hi > self.mid && self.mid > self.lo
    }

    /// Same window with the upper bound lowered by `step` (saturating at 0).
    #[inline]
    #[must_use]
    pub const fn narrowed(self, step: u8) -> Self {
        Self {
            hi: self.hi.saturating_sub(step),
            ..self
        }
    }
}

impl Default for TrimWindow {
    fn default() -> Self {
        Self::NOMINAL
    }
}

/// Median and RMS of a set of raw samples.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Baseline {
    pub median: f32,
    pub rms: f32,
}

/// Everything known about one channel after (partial) calibration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelState {
    pub baseline: Baseline,
    pub masked: bool,
    /// Threshold drop per trim step over the linear region; 0 when unusable.
    pub slope: f32,
    /// Highest trim still inside the linear region.
    pub trim_max: u8,
    /// Effective threshold at the upper trim bound.
    pub min_eff: f32,
    /// Effective threshold at nominal mid trim.
    pub mid_eff: f32,
    /// Effective threshold at the lower trim bound.
    pub max_eff: f32,
    pub best_trim: u8,
    pub trimmed_median: f32,
    pub trimmed_eff: f32,
    /// Threshold deficit (counts) that a unit-level DAC raise would need to cover.
    pub dac_to_add: f32,
    /// Trim response measurement failed; left out of equalization.
    pub skipped: bool,
}

/// Slope and intercept of measured threshold (counts) vs. DAC setting.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DacFit {
    pub slope: f32,
    pub intercept: f32,
}

impl DacFit {
    /// DAC setting expected to produce `raw` counts on the monitor.
    #[inline]
    pub fn invert(&self, raw: f32) -> f32 {
        (raw - self.intercept) / self.slope
    }
}

/// Unit-level calibration state. Lives for one unit's calibration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UnitState {
    /// Pruned baseline over all unmasked channels.
    pub baseline: Baseline,
    /// Too many noisy channels; trim sampling is doubled.
    pub noisy: bool,
    pub dac: u16,
    pub dac_fit: DacFit,
    /// Threshold target in mV the DAC was solved for.
    pub target_mv: f32,
    /// Threshold verification never rose above the baseline.
    pub below_baseline: bool,
    /// Median over all unmasked channels at nominal mid trim.
    pub mid_trim_median: f32,
    /// `mid_trim_median` minus the unit baseline median.
    pub mid_eff: f32,
    /// Channels whose mid-trim effective threshold was negative.
    pub base_above_threshold: usize,
    /// Channels whose trim range brackets `mid_eff`.
    pub good_channels: usize,
}
