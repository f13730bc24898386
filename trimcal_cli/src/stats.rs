//! `stats` subcommand: summary statistics of a raw sample dump.

use eyre::WrapErr;
use serde_json::json;
use std::path::Path;
use trimcal_core::BoardKind;
use trimcal_core::stats::{mean, median, rms, to_mv};

/// One raw sample per line; blank lines and `#` comments are skipped.
pub fn parse_samples(text: &str) -> eyre::Result<Vec<u16>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let v: u16 = line
            .parse()
            .map_err(|e| eyre::eyre!("invalid sample on line {}: {line:?} ({e})", idx + 1))?;
        out.push(v);
    }
    Ok(out)
}

pub fn run_stats(file: &Path, kind: BoardKind, json: bool) -> eyre::Result<()> {
    let text = std::fs::read_to_string(file)
        .wrap_err_with(|| format!("read samples {}", file.display()))?;
    let samples = parse_samples(&text)?;
    let (Some(med), Some(avg)) = (median(&samples), mean(&samples)) else {
        eyre::bail!("no samples in {}", file.display());
    };
    let med = f32::from(med);
    let spread = rms(&samples, avg);
    if json {
        println!(
            "{}",
            json!({
                "n": samples.len(),
                "median": med,
                "mean": avg,
                "rms": spread,
                "median_mv": to_mv(med, kind),
                "mean_mv": to_mv(avg, kind),
                "rms_mv": to_mv(spread, kind),
            })
        );
    } else {
        println!("n       {}", samples.len());
        println!("median  {med:.0} counts  {:.2} mV", to_mv(med, kind));
        println!("mean    {avg:.2} counts  {:.2} mV", to_mv(avg, kind));
        println!("rms     {spread:.2} counts  {:.2} mV", to_mv(spread, kind));
    }
    Ok(())
}
