//! # Telemetry Recorder
//!
//! Writes received control states as JSON Lines.
//!
//! ## File Layout
//!
//! ```text
//! {log_dir}/telemetry_20250101_120000_000.jsonl
//! {log_dir}/telemetry_20250101_120000_001.jsonl
//! ```
//!
//! A file is closed after `max_records_per_file` records and a new one is
//! started. Only the newest `max_files_to_keep` files are retained.
//!
//! ## Record Format
//!
//! ```json
//! {"recordedAt":"2025-01-01T12:00:00.123Z","room":"AB12","x":30.0,"y":-10.0,"isBoosting":true,"updatedAt":1735732800000}
//! ```

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::sync::ControlState;

const FILE_PREFIX: &str = "telemetry_";
const FILE_SUFFIX: &str = ".jsonl";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TelemetryRecord<'a> {
    recorded_at: String,
    room: &'a str,
    #[serde(flatten)]
    state: &'a ControlState,
}

/// Rotating JSONL writer.
#[derive(Debug)]
pub struct TelemetryRecorder {
    log_dir: PathBuf,
    room: String,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    records_in_file: usize,
    file_index: u32,
}

impl TelemetryRecorder {
    /// Creates the log directory and prepares the first file.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the directory cannot be created.
    pub fn new<P: AsRef<Path>>(
        log_dir: P,
        room: &str,
        max_records_per_file: usize,
        max_files_to_keep: usize,
    ) -> Result<Self> {
        let log_dir = log_dir.as_ref().to_path_buf();
        fs::create_dir_all(&log_dir)?;
        info!("Recording telemetry to {}", log_dir.display());

        Ok(Self {
            log_dir,
            room: room.to_string(),
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            writer: None,
            records_in_file: 0,
            file_index: 0,
        })
    }

    /// Appends one state.
    ///
    /// # Errors
    ///
    /// Returns `Io` or `Json` if the record cannot be written.
    pub fn record(&mut self, state: &ControlState) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let record = TelemetryRecord {
            recorded_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            room: &self.room,
            state,
        };
        let line = serde_json::to_string(&record)?;

        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", line)?;
            self.records_in_file += 1;
        }
        Ok(())
    }

    /// Flushes buffered records to disk.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the flush fails.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn rotate(&mut self) -> Result<()> {
        self.flush()?;

        let name = format!(
            "{}{}_{:03}{}",
            FILE_PREFIX,
            chrono::Local::now().format("%Y%m%d_%H%M%S"),
            self.file_index,
            FILE_SUFFIX
        );
        self.file_index += 1;

        let path = self.log_dir.join(name);
        let file = File::create(&path)?;
        debug!("Opened telemetry file {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.records_in_file = 0;
        self.prune();
        Ok(())
    }

    fn prune(&self) {
        let mut files = match telemetry_files(&self.log_dir) {
            Ok(files) => files,
            Err(e) => {
                warn!("Could not list telemetry files: {}", e);
                return;
            }
        };

        files.sort();
        let excess = files.len().saturating_sub(self.max_files_to_keep);
        for path in files.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Could not remove {}: {}", path.display(), e);
            }
        }
    }
}

impl Drop for TelemetryRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to flush telemetry: {}", e);
        }
    }
}

/// Lists telemetry files in `dir`.
///
/// # Errors
///
/// Returns `Io` if the directory cannot be read.
pub fn telemetry_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_telemetry = path
            .file_name()
            .map(|name| {
                let name = name.to_string_lossy();
                name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX)
            })
            .unwrap_or(false);
        if is_telemetry {
            files.push(path);
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn state(x: f32) -> ControlState {
        let mut state = ControlState::new(x, -10.0, true);
        state.updated_at = 1_700_000_000_000;
        state
    }

    #[test]
    fn test_records_are_json_lines() {
        let dir = TempDir::new().unwrap();
        let mut recorder = TelemetryRecorder::new(dir.path(), "AB12", 100, 5).unwrap();
        recorder.record(&state(30.0)).unwrap();
        recorder.record(&state(31.0)).unwrap();
        recorder.flush().unwrap();

        let files = telemetry_files(dir.path()).unwrap();
        assert_eq!(files.len(), 1);

        let contents = fs::read_to_string(&files[0]).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["room"], "AB12");
        assert_eq!(first["x"], 30.0);
        assert_eq!(first["isBoosting"], true);
        assert!(first["recordedAt"].is_string());
    }

    #[test]
    fn test_rotation_and_retention() {
        let dir = TempDir::new().unwrap();
        let mut recorder = TelemetryRecorder::new(dir.path(), "AB12", 2, 2).unwrap();
        for i in 0..7 {
            recorder.record(&state(i as f32)).unwrap();
        }
        recorder.flush().unwrap();

        // 7 records at 2 per file -> 4 files written, 2 kept
        let mut files = telemetry_files(dir.path()).unwrap();
        files.sort();
        assert_eq!(files.len(), 2);

        let last = fs::read_to_string(files.last().unwrap()).unwrap();
        assert_eq!(last.lines().count(), 1);
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let mut recorder = TelemetryRecorder::new(&nested, "AB12", 10, 1).unwrap();
        recorder.record(&state(0.0)).unwrap();
        assert!(nested.exists());
    }

    #[test]
    fn test_ignores_foreign_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();
        let mut recorder = TelemetryRecorder::new(dir.path(), "AB12", 1, 1).unwrap();
        for i in 0..3 {
            recorder.record(&state(i as f32)).unwrap();
        }
        assert!(dir.path().join("notes.txt").exists());
    }
}
