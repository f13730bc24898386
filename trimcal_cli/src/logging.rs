//! Tracing subscriber setup: console layer plus an optional JSON-lines file.

use crate::cli::FILE_GUARD;
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn rotation(name: Option<&str>) -> Rotation {
    match name.map(str::to_ascii_lowercase).as_deref() {
        Some("daily") => Rotation::DAILY,
        Some("hourly") => Rotation::HOURLY,
        _ => Rotation::NEVER,
    }
}

/// Install the global subscriber.
///
/// Level precedence: `RUST_LOG`, then `--log-level`, then `logging.level`,
/// then `info`. Safe to call more than once; later calls are ignored.
pub fn init_tracing(
    json: bool,
    level: Option<&str>,
    logging: &trimcal_config::Logging,
) -> eyre::Result<()> {
    let level = level.or(logging.level.as_deref()).unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match logging.file.as_deref() {
        Some(file) => {
            let path = Path::new(file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path.file_name().map_or_else(
                || "trimcal.log".into(),
                |n| n.to_string_lossy().into_owned(),
            );
            let appender = RollingFileAppender::builder()
                .rotation(rotation(logging.rotation.as_deref()))
                .filename_prefix(name)
                .build(dir)
                .map_err(|e| eyre::eyre!("open log file {file:?}: {e}"))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(fmt::layer().json().with_ansi(false).with_writer(writer))
        }
        None => None,
    };

    // Console output goes to stderr so stdout stays machine-readable.
    let result = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init()
    };
    // Already installed (tests, repeated calls): keep the first subscriber.
    let _ = result;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_names() {
        assert_eq!(rotation(Some("Daily")), Rotation::DAILY);
        assert_eq!(rotation(Some("hourly")), Rotation::HOURLY);
        assert_eq!(rotation(None), Rotation::NEVER);
        assert_eq!(rotation(Some("never")), Rotation::NEVER);
    }
}
