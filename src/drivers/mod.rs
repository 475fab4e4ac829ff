use std::path::{Path, PathBuf};

use crate::config::BackupKind;
use crate::error::Result;

pub mod command;
pub mod selector;
pub mod sevenzip;
pub mod tar;

pub use command::{ExecutionResult, RunLimits, ToolCommand};
pub use selector::Backend;

/// One directory's backup, resolved down to concrete paths.
#[derive(Debug, Clone)]
pub struct BackupJob {
    pub source: PathBuf,
    pub folder_name: String,
    pub kind: BackupKind,
    /// Full archive a differential derives from.
    pub base: Option<PathBuf>,
    pub artifact: PathBuf,
    pub compression_level: u8,
    pub timestamp: String,
}

impl BackupJob {
    /// Directory the source lives in; archivers run relative to it.
    pub fn parent(&self) -> &Path {
        self.source.parent().unwrap_or(Path::new("/"))
    }
}

pub trait ArchiveBackend {
    fn name(&self) -> &'static str;

    /// Artifact extension without the leading dot.
    fn extension(&self) -> &'static str;

    /// Produce a complete archive of `job.source` at `job.artifact`.
    fn full(&self, job: &BackupJob, limits: &RunLimits) -> Result<ExecutionResult>;

    /// Produce the changes since `job.base` at `job.artifact`.
    /// The base's existence is checked by the caller.
    fn differential(&self, job: &BackupJob, limits: &RunLimits) -> Result<ExecutionResult>;
}
