//! Output artifacts.
//!
//! A successful run writes the recommendation map to a per-run file and then
//! replaces the "latest" file with the same content. Both writes go through a
//! temporary file in the target directory followed by a rename, so readers
//! never observe a partially written document.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tempfile::NamedTempFile;
use tracing::info;

use crate::config::OutputConfig;
use crate::error::{Error, Result};
use crate::model::{Recommendation, RepoId};
use crate::pipeline::RunReport;

/// Paths written for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenPaths {
    /// Per-run file.
    pub snapshot: PathBuf,
    /// The "latest" file.
    pub latest: PathBuf,
    /// Per-seed files, when enabled.
    pub per_repo: Vec<PathBuf>,
}

/// Recommendation lists in the order the seeds were chosen.
fn seed_ordered(report: &RunReport) -> impl Iterator<Item = (&RepoId, &Vec<Recommendation>)> {
    report
        .seeds
        .iter()
        .filter_map(|seed| report.recommendations.get_key_value(seed))
}

/// The recommendation map, keyed in seed order.
struct SeedOrdered<'a>(&'a RunReport);

impl Serialize for SeedOrdered<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(seed_ordered(self.0))
    }
}

#[derive(Serialize)]
struct RepoFile<'a> {
    repo: &'a RepoId,
    generated_at: DateTime<Utc>,
    recommendations: &'a [Recommendation],
}

/// Writes run reports to disk.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    config: OutputConfig,
}

impl OutputWriter {
    /// A writer for `config`.
    #[must_use]
    pub const fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    /// Path of the per-run file for a run finished at `generated_at`.
    #[must_use]
    pub fn snapshot_path(&self, generated_at: DateTime<Utc>) -> PathBuf {
        let name = if self.config.timestamp_suffix {
            format!(
                "{}-{}.json",
                self.config.filename,
                generated_at.format("%Y%m%d-%H%M%S")
            )
        } else {
            format!("{}.json", self.config.filename)
        };
        self.config.directory.join(name)
    }

    /// Path of the "latest" file.
    #[must_use]
    pub fn latest_path(&self) -> PathBuf {
        self.config.directory.join(&self.config.latest_filename)
    }

    /// Write every artifact of `report`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Output`] when a directory or file cannot be written.
    pub fn write(&self, report: &RunReport) -> Result<WrittenPaths> {
        create_dir(&self.config.directory)?;
        let document = serde_json::to_vec_pretty(&SeedOrdered(report))?;

        let snapshot = self.snapshot_path(report.generated_at);
        write_atomic(&snapshot, &document)?;
        let latest = self.latest_path();
        if latest != snapshot {
            write_atomic(&latest, &document)?;
        }

        let per_repo = match &self.config.per_repo_directory {
            Some(dir) => write_per_repo(dir, report)?,
            None => Vec::new(),
        };

        info!(
            snapshot = %snapshot.display(),
            latest = %latest.display(),
            per_repo = per_repo.len(),
            "Wrote recommendations"
        );
        Ok(WrittenPaths {
            snapshot,
            latest,
            per_repo,
        })
    }
}

fn write_per_repo(dir: &Path, report: &RunReport) -> Result<Vec<PathBuf>> {
    create_dir(dir)?;
    seed_ordered(report)
        .map(|(repo, recommendations)| {
            let path = dir.join(format!("{}.json", repo.file_stem()));
            let file = RepoFile {
                repo,
                generated_at: report.generated_at,
                recommendations,
            };
            write_atomic(&path, &serde_json::to_vec_pretty(&file)?)?;
            Ok(path)
        })
        .collect()
}

pub(crate) fn create_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|source| Error::Output {
        path: dir.to_path_buf(),
        source,
    })
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let output_error = |source| Error::Output {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file = NamedTempFile::new_in(dir).map_err(output_error)?;
    file.write_all(bytes).map_err(output_error)?;
    file.as_file().sync_all().map_err(output_error)?;
    file.persist(path).map_err(|e| output_error(e.error))?;
    Ok(())
}
