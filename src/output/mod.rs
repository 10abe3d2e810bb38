//! Persisting a run's result set.
//!
//! [`ResultWriter`] writes three files into the output directory:
//!
//! - `literature_results.csv` - snapshot, overwritten every run
//! - `literature_results_<YYYYMMDD_HHMMSS>.csv` - archive with the same bytes
//! - `literature_summary_<YYYYMMDD_HHMMSS>.md` - Markdown table of the archive
//!
//! Everything is staged in temporary files inside the output directory and
//! renamed into place, snapshot last. If the snapshot cannot be replaced the
//! archive files are removed again, so a failed write leaves the previous
//! snapshot untouched and no partial output behind.

pub mod csv;
pub mod markdown;

pub use self::csv::{read_rows, CsvRow, COLUMNS};

use chrono::{DateTime, Utc};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::HarvestError;
use crate::models::ResultSet;

/// Snapshot file name
pub const SNAPSHOT_FILE: &str = "literature_results.csv";

/// Paths of the files written by one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFiles {
    pub csv_path: PathBuf,
    pub timestamped_csv_path: PathBuf,
    pub summary_md_path: PathBuf,
}

/// Writes result sets as CSV plus a Markdown summary
#[derive(Debug, Clone)]
pub struct ResultWriter {
    directory: PathBuf,
}

impl ResultWriter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Paths a run at `run_at` writes to
    pub fn paths(&self, run_at: DateTime<Utc>) -> WrittenFiles {
        let stamp = run_at.format("%Y%m%d_%H%M%S");
        WrittenFiles {
            csv_path: self.directory.join(SNAPSHOT_FILE),
            timestamped_csv_path: self.directory.join(format!("literature_results_{}.csv", stamp)),
            summary_md_path: self.directory.join(format!("literature_summary_{}.md", stamp)),
        }
    }

    /// Write the snapshot, the archive and the summary
    pub fn write(&self, results: &ResultSet, run_at: DateTime<Utc>) -> Result<WrittenFiles, HarvestError> {
        let paths = self.paths(run_at);

        fs::create_dir_all(&self.directory)
            .map_err(|e| HarvestError::write_failure(&self.directory, e))?;

        let csv_bytes = self::csv::encode(results)
            .map_err(|e| HarvestError::write_failure(&paths.timestamped_csv_path, e.into()))?;

        // The summary is derived from what was actually encoded
        let rows = read_rows(csv_bytes.as_slice())
            .map_err(|e| HarvestError::write_failure(&paths.summary_md_path, e.into()))?;
        let summary = markdown::render(&rows, run_at);

        let archive = self.stage(&csv_bytes, &paths.timestamped_csv_path)?;
        let summary_file = self.stage(summary.as_bytes(), &paths.summary_md_path)?;
        let snapshot = self.stage(&csv_bytes, &paths.csv_path)?;

        persist(archive, &paths.timestamped_csv_path)?;

        if let Err(e) = persist(summary_file, &paths.summary_md_path) {
            remove_quietly(&paths.timestamped_csv_path);
            return Err(e);
        }

        if let Err(e) = persist(snapshot, &paths.csv_path) {
            remove_quietly(&paths.timestamped_csv_path);
            remove_quietly(&paths.summary_md_path);
            return Err(e);
        }

        tracing::info!("Saved {} records to {}", results.len(), paths.timestamped_csv_path.display());
        tracing::info!("Updated snapshot {}", paths.csv_path.display());
        tracing::info!("Saved Markdown summary to {}", paths.summary_md_path.display());

        Ok(paths)
    }

    /// Write `contents` to a temporary file next to `target`
    fn stage(&self, contents: &[u8], target: &Path) -> Result<NamedTempFile, HarvestError> {
        let mut file = NamedTempFile::new_in(&self.directory)
            .map_err(|e| HarvestError::write_failure(target, e))?;
        file.write_all(contents)
            .and_then(|_| file.as_file().sync_all())
            .map_err(|e| HarvestError::write_failure(target, e))?;
        Ok(file)
    }
}

fn persist(file: NamedTempFile, target: &Path) -> Result<(), HarvestError> {
    file.persist(target)
        .map(|_| ())
        .map_err(|e| HarvestError::write_failure(target, e.error))
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!("Could not remove {}: {}", path.display(), e);
    }
}
