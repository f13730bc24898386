//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "trimcal", version, about = "Front-end threshold and trimmer calibration")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/trimcal.toml")]
    pub config: PathBuf,

    /// Log and print results as JSON instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); defaults to logging.level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Monitor line flavour for `stats`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum KindArg {
    Direct,
    Divided,
}

impl From<KindArg> for trimcal_core::BoardKind {
    fn from(k: KindArg) -> Self {
        match k {
            KindArg::Direct => Self::Direct,
            KindArg::Divided => Self::Divided,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Calibrate every configured unit of the board
    Calibrate {
        /// Calibrate only the first N configured units
        #[arg(long, value_name = "N")]
        units: Option<usize>,
        /// Write the channel CSV, trims JSON and report here (overrides output.dir)
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
        /// Seed for the simulated front end (overrides simulation.seed)
        #[arg(long, value_name = "N")]
        seed: Option<u64>,
    },
    /// Validate the config and take one read per unit
    SelfCheck,
    /// Median, mean and RMS of raw samples (one integer per line)
    Stats {
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_enum, default_value = "direct")]
        kind: KindArg,
    },
}
