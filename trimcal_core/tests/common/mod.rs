#![allow(dead_code)]

use std::collections::VecDeque;
use trimcal_traits::{FrontEnd, HwResult, MonitorMode};

pub const CHANNELS: usize = 64;

/// Noise-free board model with scripted verification reads.
///
/// - analog output of a channel cycles `baselines[ch]`, `+noise[ch]`,
///   `-noise[ch]` (median stays on the baseline)
/// - common DAC output is `dac_gain * dac + dac_offset`
/// - trimmed threshold is the DAC output plus `offsets[ch]` minus
///   `trim_gains[ch] * (trim - 14)`, with trims above `trim_ceiling[ch]`
///   acting like the ceiling
///
/// Common-DAC reads come in rounds of `sweep_points` sweep reads followed by
/// one verification read. Each verification read is scaled by the next
/// factor in `verify_script` (1.0 once empty); after it, `dac_gain` takes the
/// next value from `gain_steps`, if any.
pub struct MockBoard {
    pub baselines: [u16; CHANNELS],
    pub noise: [u16; CHANNELS],
    pub offsets: [f32; CHANNELS],
    pub dac_gain: f32,
    pub dac_offset: f32,
    pub trim_gains: [f32; CHANNELS],
    pub trim_ceiling: [u8; CHANNELS],
    pub sweep_points: usize,
    pub verify_script: VecDeque<f32>,
    pub gain_steps: VecDeque<f32>,
    /// 1-based indices of trimmed-threshold reads that fail with a link error.
    pub failing_trimmed_reads: Vec<usize>,
    pub dac: u16,
    pub trims: [u8; CHANNELS],
    pub routed: Option<(usize, MonitorMode)>,
    pub modes_seen: Vec<MonitorMode>,
    pub trim_writes: Vec<(usize, u8)>,
    /// (channel, mode, count) of every read request.
    pub reads: Vec<(usize, MonitorMode, usize)>,
    common_reads: usize,
    trimmed_reads: usize,
}

impl MockBoard {
    pub fn flat(baseline: u16) -> Self {
        Self {
            baselines: [baseline; CHANNELS],
            noise: [0; CHANNELS],
            offsets: [0.0; CHANNELS],
            dac_gain: 2.0,
            dac_offset: 40.0,
            trim_gains: [4.0; CHANNELS],
            trim_ceiling: [31; CHANNELS],
            sweep_points: 7,
            verify_script: VecDeque::new(),
            gain_steps: VecDeque::new(),
            failing_trimmed_reads: Vec::new(),
            dac: 0,
            trims: [0; CHANNELS],
            routed: None,
            modes_seen: Vec::new(),
            trim_writes: Vec::new(),
            reads: Vec::new(),
            common_reads: 0,
            trimmed_reads: 0,
        }
    }

    pub fn with_script(mut self, factors: &[f32]) -> Self {
        self.verify_script = factors.iter().copied().collect();
        self
    }

    fn common(&self) -> f32 {
        self.dac_gain * f32::from(self.dac) + self.dac_offset
    }

    /// Read counts requested in `mode`, in order.
    pub fn counts(&self, mode: MonitorMode) -> Vec<usize> {
        self.reads
            .iter()
            .filter(|(_, m, _)| *m == mode)
            .map(|&(_, _, n)| n)
            .collect()
    }

    /// Trims written to `channel`, in order.
    pub fn trims_written(&self, channel: usize) -> Vec<u8> {
        self.trim_writes
            .iter()
            .filter(|(ch, _)| *ch == channel)
            .map(|&(_, t)| t)
            .collect()
    }
}

fn to_sample(level: f32) -> u16 {
    level.round().clamp(0.0, 4095.0) as u16
}

impl FrontEnd for MockBoard {
    fn configure_channel_monitor(
        &mut self,
        _unit: usize,
        channel: usize,
        mode: MonitorMode,
    ) -> HwResult<()> {
        self.routed = Some((channel, mode));
        self.modes_seen.push(mode);
        Ok(())
    }

    fn configure_channel_trim(&mut self, _unit: usize, channel: usize, trim: u8) -> HwResult<()> {
        self.trims[channel] = trim;
        self.trim_writes.push((channel, trim));
        Ok(())
    }

    fn configure_global_threshold(&mut self, _unit: usize, dac: u16) -> HwResult<()> {
        self.dac = dac;
        Ok(())
    }

    fn read_consecutive_samples(&mut self, _unit: usize, count: usize) -> HwResult<Vec<u16>> {
        let (ch, mode) = self.routed.ok_or("monitor not configured")?;
        self.reads.push((ch, mode, count));
        let level = match mode {
            MonitorMode::ChannelAnalog => {
                let base = f32::from(self.baselines[ch]);
                let a = f32::from(self.noise[ch]);
                let cycle = [base, base + a, base - a];
                return Ok((0..count).map(|i| to_sample(cycle[i % 3])).collect());
            }
            MonitorMode::CommonThresholdDac => {
                self.common_reads += 1;
                if self.common_reads % (self.sweep_points + 1) == 0 {
                    let factor = self.verify_script.pop_front().unwrap_or(1.0);
                    let level = self.common() * factor;
                    if let Some(gain) = self.gain_steps.pop_front() {
                        self.dac_gain = gain;
                    }
                    level
                } else {
                    self.common()
                }
            }
            MonitorMode::ChannelTrimmedThreshold => {
                self.trimmed_reads += 1;
                if self.failing_trimmed_reads.contains(&self.trimmed_reads) {
                    return Err("link error: no reply".into());
                }
                let trim = self.trims[ch].min(self.trim_ceiling[ch]);
                self.common() + self.offsets[ch] - self.trim_gains[ch] * (f32::from(trim) - 14.0)
            }
        };
        Ok(vec![to_sample(level); count])
    }
}
