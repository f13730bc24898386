//! Append-only report of calibration warnings, keyed by unit.

use crate::error::CalibError;
use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Destination for one-line warnings about a unit.
///
/// Implementations must serialise concurrent writers; every call writes
/// exactly one line.
pub trait ReportSink {
    fn append_line(&self, unit_id: &str, message: &str) -> std::io::Result<()>;
}

impl<R: ReportSink + ?Sized> ReportSink for &R {
    fn append_line(&self, unit_id: &str, message: &str) -> std::io::Result<()> {
        (**self).append_line(unit_id, message)
    }
}

/// Log `message` as a warning and append it to `sink`. A failing sink is
/// logged and otherwise ignored.
pub fn note(sink: &dyn ReportSink, unit_id: &str, message: impl Display) {
    let message = message.to_string();
    tracing::warn!(unit = unit_id, "{message}");
    if let Err(e) = sink.append_line(unit_id, &message) {
        tracing::error!(unit = unit_id, error = %e, "failed to write report line");
    }
}

/// Report file opened once in append mode and shared behind a mutex.
pub struct FileReport {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileReport {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CalibError> {
        let path = path.as_ref().to_path_buf();
        let unusable = |e: std::io::Error| CalibError::Report(format!("{}: {e}", path.display()));
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(unusable)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(unusable)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportSink for FileReport {
    fn append_line(&self, unit_id: &str, message: &str) -> std::io::Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| std::io::Error::other("report lock poisoned"))?;
        writeln!(file, "{unit_id}: {message}")?;
        file.flush()
    }
}

/// In-memory sink, mostly for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryReport {
    lines: Mutex<Vec<(String, String)>>,
}

impl MemoryReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of `(unit_id, message)` pairs in write order.
    pub fn lines(&self) -> Vec<(String, String)> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// True if any line for `unit_id` contains `needle`.
    pub fn contains(&self, unit_id: &str, needle: &str) -> bool {
        self.lines()
            .iter()
            .any(|(u, m)| u == unit_id && m.contains(needle))
    }
}

impl ReportSink for MemoryReport {
    fn append_line(&self, unit_id: &str, message: &str) -> std::io::Result<()> {
        self.lines
            .lock()
            .map_err(|_| std::io::Error::other("report lock poisoned"))?
            .push((unit_id.to_string(), message.to_string()));
        Ok(())
    }
}
