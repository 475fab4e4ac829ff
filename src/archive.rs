//! Full and differential backups of directories, one at a time or in batches.

use chrono::Local;
use indicatif::ProgressBar;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::config::settings::validate_timestamp_format;
use crate::config::{BackupKind, Settings};
use crate::drivers::{ArchiveBackend, Backend, BackupJob, ExecutionResult, RunLimits};
use crate::error::{Result, ZipdirError};
use crate::storage::{BatchLog, artifact_name, folder_name};

pub struct ArchiveDriver {
    backend: Backend,
    save_path: PathBuf,
    timestamp_format: String,
    compression_level: u8,
    limits: RunLimits,
}

#[derive(Debug)]
pub struct BatchReport {
    pub log_path: PathBuf,
    pub processed: usize,
}

impl ArchiveDriver {
    pub fn new(
        backend: Backend,
        save_path: &Path,
        timestamp_format: &str,
        compression_level: u8,
        limits: RunLimits,
    ) -> Result<Self> {
        validate_timestamp_format(timestamp_format)?;
        if compression_level > 9 {
            return Err(ZipdirError::Config(format!(
                "compression level {} out of range 0-9",
                compression_level
            )));
        }
        fs::create_dir_all(save_path)?;
        Ok(Self {
            backend,
            save_path: fs::canonicalize(save_path)?,
            timestamp_format: timestamp_format.to_string(),
            compression_level,
            limits,
        })
    }

    pub fn from_settings(settings: &Settings, backend: Backend, save_path: &Path) -> Result<Self> {
        let limits = RunLimits {
            timeout: settings.tool_timeout_secs.map(std::time::Duration::from_secs),
            grace: std::time::Duration::from_secs(settings.kill_grace_secs),
        };
        Self::new(backend, save_path, &settings.timestamp_format, settings.compression_level, limits)
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    fn timestamp(&self) -> String {
        Local::now().format(&self.timestamp_format).to_string()
    }

    /// Resolve `dir` into a job with a fresh timestamped artifact path.
    pub fn prepare(&self, dir: &Path, kind: BackupKind, base: Option<&Path>) -> Result<BackupJob> {
        if !dir.is_dir() {
            return Err(ZipdirError::Precondition(format!("{} is not a directory", dir.display())));
        }
        let source = fs::canonicalize(dir)?;
        let folder = folder_name(&source)?;
        let timestamp = self.timestamp();
        let artifact = self
            .save_path
            .join(artifact_name(&folder, &timestamp, kind, self.backend.extension()));
        if artifact.exists() {
            return Err(ZipdirError::Precondition(format!("{} already exists", artifact.display())));
        }
        Ok(BackupJob {
            source,
            folder_name: folder,
            kind,
            base: base.map(Path::to_path_buf),
            artifact,
            compression_level: self.compression_level,
            timestamp,
        })
    }

    pub fn full_backup(&self, dir: &Path) -> Result<ExecutionResult> {
        let job = self.prepare(dir, BackupKind::Full, None)?;
        info!(dir = %job.source.display(), artifact = %job.artifact.display(), backend = self.backend.name(), "full backup");
        let result = self.backend.full(&job, &self.limits)?;
        report_stderr(&job, &result);
        Ok(result)
    }

    /// Differential against `base`, which must be an existing full archive.
    pub fn differential_backup(&self, dir: &Path, base: &Path) -> Result<ExecutionResult> {
        if !base.is_file() {
            return Err(ZipdirError::MissingArtifact(base.to_path_buf()));
        }
        let base = fs::canonicalize(base)?;
        let job = self.prepare(dir, BackupKind::Differential, Some(&base))?;
        info!(
            dir = %job.source.display(),
            base = %base.display(),
            artifact = %job.artifact.display(),
            backend = self.backend.name(),
            "differential backup"
        );
        let result = self.backend.differential(&job, &self.limits)?;
        report_stderr(&job, &result);
        Ok(result)
    }

    /// Full backups in order, one log line each. The first failure ends the batch.
    pub fn batch_full(&self, dirs: &[PathBuf], log_dir: &Path, bar: &ProgressBar) -> Result<BatchReport> {
        let mut log = BatchLog::create(log_dir, BackupKind::Full, &self.timestamp())?;
        for dir in dirs {
            bar.set_message(format!("Full backup of {}", dir.display()));
            let result = self.full_backup(dir).inspect_err(|e| {
                error!(dir = %dir.display(), log = %log.path().display(), error = %e, "batch aborted");
            })?;
            log.record(dir, &result)?;
            bar.inc(1);
        }
        Ok(BatchReport { log_path: log.path().to_path_buf(), processed: log.lines() })
    }

    /// Differential backups of `(directory, base archive)` pairs, in order.
    pub fn batch_differential(
        &self,
        pairs: &[(PathBuf, PathBuf)],
        log_dir: &Path,
        bar: &ProgressBar,
    ) -> Result<BatchReport> {
        let mut log = BatchLog::create(log_dir, BackupKind::Differential, &self.timestamp())?;
        for (dir, base) in pairs {
            bar.set_message(format!("Differential backup of {}", dir.display()));
            let result = self.differential_backup(dir, base).inspect_err(|e| {
                error!(dir = %dir.display(), log = %log.path().display(), error = %e, "batch aborted");
            })?;
            log.record(dir, &result)?;
            bar.inc(1);
        }
        Ok(BatchReport { log_path: log.path().to_path_buf(), processed: log.lines() })
    }
}

/// Archivers print warnings (unreadable files etc.) and still exit 0.
fn report_stderr(job: &BackupJob, result: &ExecutionResult) {
    let stderr = result.stderr.trim();
    if !stderr.is_empty() {
        warn!(dir = %job.source.display(), kind = ?job.kind, timestamp = %job.timestamp, "{}", stderr);
    }
}

/// Pair directories with their base archives; both lists must be the same length.
pub fn pair_up(dirs: Vec<PathBuf>, bases: Vec<PathBuf>) -> Result<Vec<(PathBuf, PathBuf)>> {
    if dirs.len() != bases.len() {
        return Err(ZipdirError::Precondition(format!(
            "{} directories but {} base archives",
            dirs.len(),
            bases.len()
        )));
    }
    Ok(dirs.into_iter().zip(bases).collect())
}
