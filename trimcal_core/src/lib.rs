#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Threshold and trimmer calibration engine (hardware-agnostic).
//!
//! All hardware interaction goes through `trimcal_traits::FrontEnd`; every
//! delay goes through `trimcal_traits::Clock`.
//!
//! ## Pipeline, per unit
//!
//! 1. **Baseline** (`baseline`): per-channel median/RMS, hot/dead/noisy
//!    classification, pruned unit baseline. Units with half their channels
//!    bad are abandoned here.
//! 2. **Threshold** (`threshold`): DAC sweep, least-squares gain fit,
//!    inversion onto the target and a bounded verification loop, then the
//!    unit's effective threshold at nominal mid trim.
//! 3. **Linear region** (`linear_region`): three-point trim response per
//!    channel, narrowing the upper trim bound until both segments agree.
//! 4. **Equalization** (`trim`): best trim per channel, masking, and at most
//!    one unit-level threshold raise followed by a recalculation pass.
//!
//! `calibration::Calibrator` sequences these and yields a `BoardResult`.
//!
//! ## Units
//!
//! Internals work in raw ADC counts (`f32` where medians are subtracted).
//! Millivolt values appear only at cutoffs and in reports; see `stats::to_mv`.

pub mod baseline;
pub mod calibration;
pub mod config;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod linear_region;
pub mod report;
pub mod retry;
pub mod sampler;
pub mod stats;
pub mod threshold;
pub mod trim;
pub mod types;

pub use calibration::{AbandonReason, BoardResult, Calibrator, UnitOutcome, UnitResult};
pub use config::CalibCfg;
pub use error::{CalibError, RecoverableError, Result, StatsError};
pub use report::{FileReport, MemoryReport, ReportSink};
pub use types::{
    Baseline, BoardKind, CHANNELS_PER_UNIT, ChannelArray, ChannelState, TrimWindow, UnitState,
};
