#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `trimcal`: calibrate the global threshold and per-channel trimmers of a
//! readout board, then write trims, masks and diagnostics.

mod calibrate;
mod cli;
mod error_fmt;
mod logging;
mod stats;

use clap::Parser;
use cli::{Cli, Commands, JSON_MODE};
use eyre::WrapErr;
use std::path::Path;

fn load_config(path: &Path) -> eyre::Result<trimcal_config::Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = trimcal_config::load_toml(&text)
        .wrap_err_with(|| format!("parse config {}", path.display()))?;
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

fn run(cli: Cli) -> eyre::Result<()> {
    match cli.cmd {
        Commands::Stats { file, kind } => {
            logging::init_tracing(
                cli.json,
                cli.log_level.as_deref(),
                &trimcal_config::Logging::default(),
            )?;
            stats::run_stats(&file, kind.into(), cli.json)
        }
        Commands::Calibrate { units, out, seed } => {
            let cfg = load_config(&cli.config)?;
            logging::init_tracing(cli.json, cli.log_level.as_deref(), &cfg.logging)?;
            calibrate::run_calibrate(&cfg, units, out, seed, cli.json)
        }
        Commands::SelfCheck => {
            let cfg = load_config(&cli.config)?;
            logging::init_tracing(cli.json, cli.log_level.as_deref(), &cfg.logging)?;
            calibrate::run_self_check(&cfg, cli.json)
        }
    }
}

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(err) = run(cli) {
        tracing::error!(error = %err, "run failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", error_fmt::format_error_json(&err));
        } else {
            eprintln!("{}", error_fmt::humanize(&err));
        }
        std::process::exit(error_fmt::exit_code_for_error(&err));
    }
}
