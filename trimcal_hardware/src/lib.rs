//! Hardware-side implementations of `trimcal_traits::FrontEnd`.
//!
//! Only a simulated board ships here. It models per-channel baselines, a
//! linear common-threshold DAC, trimmers that saturate near the top of their
//! range and optional hot, dead or noisy channels, so the calibration engine
//! can be driven end to end without a readout board attached.

pub mod error;
pub mod sim;

pub use error::HwError;
pub use sim::{SimParams, SimulatedFrontEnd};

/// Channels on one readout unit.
pub const CHANNELS_PER_UNIT: usize = 64;
/// Largest raw sample the monitor ADC produces.
pub const ADC_MAX: u16 = 4095;
