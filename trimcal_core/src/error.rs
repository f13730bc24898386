use thiserror::Error;

/// Failures a single hardware interaction can recover from by retrying.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecoverableError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for front end")]
    Timeout,
    #[error("front end returned no samples")]
    EmptyRead,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatsError {
    #[error("invalid trim ordering: need hi > mid > lo, got hi={hi} mid={mid} lo={lo}")]
    InvalidTrimOrder { hi: u8, mid: u8, lo: u8 },
    #[error("linear fit is degenerate ({0})")]
    DegenerateFit(&'static str),
}

#[derive(Debug, Error, Clone)]
pub enum CalibError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("report sink: {0}")]
    Report(String),
    #[error("no units to calibrate")]
    NoUnits,
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
