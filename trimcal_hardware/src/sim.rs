use crate::error::HwError;
use crate::{ADC_MAX, CHANNELS_PER_UNIT};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use trimcal_traits::{FrontEnd, HwResult, MonitorMode};

/// ADC counts per millivolt on an undivided monitor line.
const COUNTS_PER_MV: f32 = 4095.0 / 1000.0;
/// Nominal trim setting the channel offsets are centred on.
const NOMINAL_TRIM: f32 = 14.0;
const MAX_TRIM: u8 = 31;

/// Knobs for the simulated board.
#[derive(Debug, Clone)]
pub struct SimParams {
    pub seed: u64,
    /// Number of unit slots on the board (unit indices `0..units`).
    pub units: usize,
    /// Quiescent channel output in mV.
    pub baseline_mv: f32,
    /// Channel-to-channel baseline spread (1 sigma, mV).
    pub baseline_spread_mv: f32,
    /// Per-sample noise (1 sigma, mV).
    pub noise_mv: f32,
    /// Common threshold DAC gain in ADC counts per DAC count.
    pub dac_gain: f32,
    /// Common threshold DAC offset in ADC counts.
    pub dac_offset: f32,
    /// Threshold drop per trim step (ADC counts).
    pub trim_gain: f32,
    /// Channel-to-channel threshold offset spread (1 sigma, ADC counts).
    pub threshold_spread: f32,
    pub hot_channels: Vec<(usize, usize)>,
    pub dead_channels: Vec<(usize, usize)>,
    pub noisy_channels: Vec<(usize, usize)>,
    /// Fail every Nth sample read with a link error (0 disables).
    pub fail_every: u64,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            seed: 42,
            units: 8,
            baseline_mv: 160.0,
            baseline_spread_mv: 2.0,
            noise_mv: 1.5,
            dac_gain: 2.0,
            dac_offset: 40.0,
            trim_gain: 4.0,
            threshold_spread: 12.0,
            hot_channels: Vec::new(),
            dead_channels: Vec::new(),
            noisy_channels: Vec::new(),
            fail_every: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct SimChannel {
    baseline: f32,
    noise: f32,
    offset: f32,
    trim_gain: f32,
    /// Trim value beyond which the trimmer stops lowering the threshold.
    saturation: u8,
    trim: u8,
}

#[derive(Debug, Clone)]
struct SimUnit {
    channels: Vec<SimChannel>,
    dac: u16,
    dac_gain: f32,
    routed: Option<(usize, MonitorMode)>,
}

/// Deterministic (seeded) stand-in for a readout board.
pub struct SimulatedFrontEnd {
    units: Vec<SimUnit>,
    params: SimParams,
    rng: StdRng,
    reads: u64,
}

impl SimulatedFrontEnd {
    pub fn new(params: SimParams) -> Self {
        let mut rng = StdRng::seed_from_u64(params.seed);
        let units = (0..params.units)
            .map(|unit| build_unit(unit, &params, &mut rng))
            .collect();
        tracing::debug!(
            units = params.units,
            seed = params.seed,
            "simulated front end ready"
        );
        Self {
            units,
            params,
            rng,
            reads: 0,
        }
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    /// Current DAC setting of a unit, if the unit exists.
    pub fn global_threshold(&self, unit: usize) -> Option<u16> {
        self.units.get(unit).map(|u| u.dac)
    }

    /// Current trim setting of a channel, if it exists.
    pub fn channel_trim(&self, unit: usize, channel: usize) -> Option<u8> {
        self.units
            .get(unit)
            .and_then(|u| u.channels.get(channel))
            .map(|c| c.trim)
    }

    fn unit_mut(&mut self, unit: usize) -> Result<&mut SimUnit, HwError> {
        self.units
            .get_mut(unit)
            .ok_or(HwError::InvalidChannel { unit, channel: 0 })
    }

    fn gaussian(&mut self) -> f32 {
        gaussian(&mut self.rng)
    }
}

fn build_unit(unit: usize, p: &SimParams, rng: &mut StdRng) -> SimUnit {
    let channels = (0..CHANNELS_PER_UNIT)
        .map(|ch| {
            let mut baseline_mv = p.baseline_mv + p.baseline_spread_mv * gaussian(rng);
            if p.hot_channels.contains(&(unit, ch)) {
                baseline_mv += 80.0;
            }
            if p.dead_channels.contains(&(unit, ch)) {
                baseline_mv -= 80.0;
            }
            let noise_mv = if p.noisy_channels.contains(&(unit, ch)) {
                30.0
            } else {
                p.noise_mv
            };
            // Most trimmers stay linear to the top; a few flatten out early.
            let saturation = if rng.gen_range(0..8) == 0 {
                rng.gen_range(20..=28)
            } else {
                MAX_TRIM
            };
            SimChannel {
                baseline: baseline_mv * COUNTS_PER_MV,
                noise: noise_mv * COUNTS_PER_MV,
                offset: p.threshold_spread * gaussian(rng),
                trim_gain: p.trim_gain * (1.0 + 0.05 * gaussian(rng)),
                saturation,
                trim: 0,
            }
        })
        .collect();
    SimUnit {
        channels,
        dac: 0,
        dac_gain: p.dac_gain * (1.0 + 0.02 * gaussian(rng)),
        routed: None,
    }
}

/// Standard normal deviate (Box-Muller).
fn gaussian(rng: &mut StdRng) -> f32 {
    let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
    let u2: f32 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos()
}

#[inline]
fn to_sample(value: f32) -> u16 {
    if value <= 0.0 {
        0
    } else {
        // Clamped to ADC range before the narrowing cast.
        value.round().min(f32::from(ADC_MAX)) as u16
    }
}

impl FrontEnd for SimulatedFrontEnd {
    fn configure_channel_monitor(
        &mut self,
        unit: usize,
        channel: usize,
        mode: MonitorMode,
    ) -> HwResult<()> {
        if channel >= CHANNELS_PER_UNIT {
            return Err(Box::new(HwError::InvalidChannel { unit, channel }));
        }
        self.unit_mut(unit)?.routed = Some((channel, mode));
        Ok(())
    }

    fn configure_channel_trim(&mut self, unit: usize, channel: usize, trim: u8) -> HwResult<()> {
        let u = self.unit_mut(unit)?;
        let ch = u
            .channels
            .get_mut(channel)
            .ok_or(HwError::InvalidChannel { unit, channel })?;
        ch.trim = trim.min(MAX_TRIM);
        Ok(())
    }

    fn configure_global_threshold(&mut self, unit: usize, dac: u16) -> HwResult<()> {
        self.unit_mut(unit)?.dac = dac;
        Ok(())
    }

    fn read_consecutive_samples(&mut self, unit: usize, count: usize) -> HwResult<Vec<u16>> {
        self.reads += 1;
        if self.params.fail_every > 0 && self.reads % self.params.fail_every == 0 {
            tracing::trace!(unit, read = self.reads, "injecting link failure");
            return Err(Box::new(HwError::Link("sca reply missing".into())));
        }
        let dac_offset = self.params.dac_offset;
        let (channel, mode) = self
            .unit_mut(unit)?
            .routed
            .ok_or_else(|| HwError::Link(format!("unit {unit} monitor not configured")))?;
        let u = &self.units[unit];
        let ch = u.channels[channel].clone();
        let common = dac_offset + u.dac_gain * f32::from(u.dac);
        let (level, sigma) = match mode {
            MonitorMode::ChannelAnalog => (ch.baseline, ch.noise),
            MonitorMode::CommonThresholdDac => (common, self.params.noise_mv * COUNTS_PER_MV),
            MonitorMode::ChannelTrimmedThreshold => {
                let effective_trim = f32::from(ch.trim.min(ch.saturation));
                let level = common + ch.offset + ch.trim_gain * (NOMINAL_TRIM - effective_trim);
                (level, ch.noise)
            }
        };
        let samples = (0..count)
            .map(|_| to_sample(level + sigma * self.gaussian()))
            .collect();
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mean(v: &[u16]) -> f32 {
        v.iter().map(|&s| f32::from(s)).sum::<f32>() / v.len() as f32
    }

    #[test]
    fn same_seed_same_samples() {
        let mut a = SimulatedFrontEnd::new(SimParams::default());
        let mut b = SimulatedFrontEnd::new(SimParams::default());
        for fe in [&mut a, &mut b] {
            fe.configure_channel_monitor(0, 3, MonitorMode::ChannelAnalog)
                .unwrap();
        }
        assert_eq!(
            a.read_consecutive_samples(0, 16).unwrap(),
            b.read_consecutive_samples(0, 16).unwrap()
        );
    }

    #[test]
    fn raising_trim_lowers_threshold() {
        let mut fe = SimulatedFrontEnd::new(SimParams {
            noise_mv: 0.1,
            ..SimParams::default()
        });
        fe.configure_global_threshold(0, 300).unwrap();
        fe.configure_channel_monitor(0, 5, MonitorMode::ChannelTrimmedThreshold)
            .unwrap();
        fe.configure_channel_trim(0, 5, 0).unwrap();
        let low_trim = mean(&fe.read_consecutive_samples(0, 50).unwrap());
        fe.configure_channel_trim(0, 5, 14).unwrap();
        let mid_trim = mean(&fe.read_consecutive_samples(0, 50).unwrap());
        assert!(low_trim > mid_trim);
    }

    #[test]
    fn unrouted_read_is_an_error() {
        let mut fe = SimulatedFrontEnd::new(SimParams::default());
        assert!(fe.read_consecutive_samples(1, 4).is_err());
    }
}
