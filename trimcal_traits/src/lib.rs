pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Error type crossing the hardware seam. Implementations are free to box
/// their own typed errors; the core maps them back on its side.
pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// What the unit's analog monitor output is routed to while sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorMode {
    /// The channel's analog output (no threshold applied). Used for baselines.
    ChannelAnalog,
    /// The channel's threshold after the per-channel trim is applied.
    ChannelTrimmedThreshold,
    /// The unit's common threshold DAC output.
    CommonThresholdDac,
}

/// Register and sampling access to one readout board.
///
/// Every call may fail with a recoverable communication error; callers own
/// the retry policy.
pub trait FrontEnd {
    fn configure_channel_monitor(
        &mut self,
        unit: usize,
        channel: usize,
        mode: MonitorMode,
    ) -> HwResult<()>;

    fn configure_channel_trim(&mut self, unit: usize, channel: usize, trim: u8) -> HwResult<()>;

    fn configure_global_threshold(&mut self, unit: usize, dac: u16) -> HwResult<()>;

    /// Read `count` consecutive raw ADC samples of the currently routed monitor.
    fn read_consecutive_samples(&mut self, unit: usize, count: usize) -> HwResult<Vec<u16>>;
}

impl<F: FrontEnd + ?Sized> FrontEnd for &mut F {
    fn configure_channel_monitor(
        &mut self,
        unit: usize,
        channel: usize,
        mode: MonitorMode,
    ) -> HwResult<()> {
        (**self).configure_channel_monitor(unit, channel, mode)
    }

    fn configure_channel_trim(&mut self, unit: usize, channel: usize, trim: u8) -> HwResult<()> {
        (**self).configure_channel_trim(unit, channel, trim)
    }

    fn configure_global_threshold(&mut self, unit: usize, dac: u16) -> HwResult<()> {
        (**self).configure_global_threshold(unit, dac)
    }

    fn read_consecutive_samples(&mut self, unit: usize, count: usize) -> HwResult<Vec<u16>> {
        (**self).read_consecutive_samples(unit, count)
    }
}
