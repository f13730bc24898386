//! Synchronous sample acquisition over a `FrontEnd`.
//!
//! The sampler owns the front end and the clock. Each request routes one
//! channel's monitor (optionally setting its trim and the unit DAC first) and
//! reads a block of consecutive samples. Hardware access is strictly
//! sequential; nothing here spawns threads.

use crate::error::RecoverableError;
use crate::hw_error::map_hw_error;
use crate::retry::{RetryPolicy, retry_with_backoff};
use std::time::Duration;
use trimcal_traits::{Clock, FrontEnd, MonitorMode};

/// One acquisition: where to look and how many samples to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRequest {
    pub unit: usize,
    pub channel: usize,
    pub mode: MonitorMode,
    pub trim: Option<u8>,
    pub dac: Option<u16>,
    pub count: usize,
}

impl SampleRequest {
    /// Channel analog output, no threshold applied.
    pub const fn baseline(unit: usize, channel: usize, count: usize) -> Self {
        Self {
            unit,
            channel,
            mode: MonitorMode::ChannelAnalog,
            trim: None,
            dac: None,
            count,
        }
    }

    /// Channel threshold at the given trim and unit DAC.
    pub const fn trimmed(unit: usize, channel: usize, trim: u8, dac: u16, count: usize) -> Self {
        Self {
            unit,
            channel,
            mode: MonitorMode::ChannelTrimmedThreshold,
            trim: Some(trim),
            dac: Some(dac),
            count,
        }
    }

    /// The unit's common threshold DAC output.
    pub const fn common_dac(unit: usize, dac: u16, count: usize) -> Self {
        Self {
            unit,
            channel: 0,
            mode: MonitorMode::CommonThresholdDac,
            trim: None,
            dac: Some(dac),
            count,
        }
    }
}

pub struct Sampler<F, C> {
    front_end: F,
    clock: C,
    policy: RetryPolicy,
}

impl<F: FrontEnd, C: Clock + Clone> Sampler<F, C> {
    pub fn new(front_end: F, clock: C, policy: RetryPolicy) -> Self {
        Self {
            front_end,
            clock,
            policy,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn front_end(&self) -> &F {
        &self.front_end
    }

    pub fn into_front_end(self) -> F {
        self.front_end
    }

    /// Sleep on the sampler's clock.
    pub fn pause(&self, d: Duration) {
        self.clock.sleep(d);
    }

    /// Single attempt; an empty read is reported as `EmptyRead`.
    pub fn try_acquire(&mut self, req: SampleRequest) -> Result<Vec<u16>, RecoverableError> {
        let fe = &mut self.front_end;
        let map = |e: Box<dyn std::error::Error + Send + Sync>| map_hw_error(e.as_ref());
        if let Some(dac) = req.dac {
            fe.configure_global_threshold(req.unit, dac).map_err(map)?;
        }
        if let Some(trim) = req.trim {
            fe.configure_channel_trim(req.unit, req.channel, trim)
                .map_err(map)?;
        }
        fe.configure_channel_monitor(req.unit, req.channel, req.mode)
            .map_err(map)?;
        let samples = fe
            .read_consecutive_samples(req.unit, req.count)
            .map_err(map)?;
        if samples.is_empty() && req.count > 0 {
            return Err(RecoverableError::EmptyRead);
        }
        tracing::trace!(
            unit = req.unit,
            channel = req.channel,
            mode = ?req.mode,
            n = samples.len(),
            "samples acquired"
        );
        Ok(samples)
    }

    /// Acquire with the sampler's default retry policy.
    pub fn acquire_samples(&mut self, req: SampleRequest) -> Vec<u16> {
        let policy = self.policy;
        self.acquire_with(req, policy)
    }

    /// Acquire under an explicit retry policy. After the last failed attempt
    /// the error is logged and an empty vector is returned.
    pub fn acquire_with(&mut self, req: SampleRequest, policy: RetryPolicy) -> Vec<u16> {
        let clock = self.clock.clone();
        match retry_with_backoff(policy, &clock, "acquire samples", |_| self.try_acquire(req)) {
            Ok(samples) => samples,
            Err(e) => {
                tracing::error!(
                    unit = req.unit,
                    channel = req.channel,
                    mode = ?req.mode,
                    error = %e,
                    "sampling failed, continuing with no data"
                );
                Vec::new()
            }
        }
    }
}
