use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("link error: {0}")]
    Link(String),
    #[error("front-end reply timeout")]
    Timeout,
    #[error("invalid channel {channel} on unit {unit}")]
    InvalidChannel { unit: usize, channel: usize },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
