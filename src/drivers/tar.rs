use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{ArchiveBackend, BackupJob, ExecutionResult, RunLimits, ToolCommand};
use crate::error::{Result, ZipdirError};
use crate::storage::snapshot_path_for;
use crate::utils::io::{deleted_members, relative_listing, write_deleted_list};

/// GNU tar with `--listed-incremental` snapshots.
///
/// Every differential starts from a copy of the full backup's snapshot, so
/// each one holds all changes since the full, never since the previous
/// differential. Removals are not representable that way; they go to a
/// deleted list written into the source directory before archiving.
pub struct TarBackend {
    command: Vec<String>,
    gzip: bool,
    deleted_list_name: String,
}

impl TarBackend {
    pub fn new(command: Vec<String>, gzip: bool, deleted_list_name: impl Into<String>) -> Self {
        Self { command, gzip, deleted_list_name: deleted_list_name.into() }
    }

    fn create(&self, job: &BackupJob, snapshot: &Path, limits: &RunLimits) -> Result<ExecutionResult> {
        let mut listed = std::ffi::OsString::from("--listed-incremental=");
        listed.push(snapshot);

        let mut cmd = ToolCommand::new(&self.command)?.arg("--create")?;
        if self.gzip {
            cmd = cmd.arg(format!("--use-compress-program=gzip -{}", job.compression_level))?;
        }
        cmd.arg("--file")?
            .arg(&job.artifact)?
            .arg(listed)?
            .arg("--directory")?
            .arg(job.parent())?
            .arg(&job.folder_name)?
            .run(limits)
    }

    /// Member names recorded in `archive`, printed verbatim so they compare
    /// against on-disk names (the default style escapes `\`, tabs and non-ASCII).
    fn list_members(&self, archive: &Path, limits: &RunLimits) -> Result<Vec<String>> {
        let mut cmd = ToolCommand::new(&self.command)?
            .arg("--list")?
            .arg("--quoting-style=literal")?;
        if self.gzip {
            cmd = cmd.arg("--gzip")?;
        }
        let out = cmd.arg("--file")?.arg(archive)?.run(limits)?;
        Ok(out.stdout.lines().map(str::to_string).collect())
    }

    fn write_tombstones(&self, job: &BackupJob, base: &Path, path: &Path, limits: &RunLimits) -> Result<()> {
        let members = self.list_members(base, limits)?;
        let current = relative_listing(&job.source, &job.folder_name)?;
        let deleted = deleted_members(&members, &current);
        write_deleted_list(path, &deleted)?;
        info!(dir = %job.source.display(), deleted = deleted.len(), "wrote deleted list");
        Ok(())
    }
}

impl ArchiveBackend for TarBackend {
    fn name(&self) -> &'static str {
        if self.gzip { "tar.gz" } else { "tar" }
    }

    fn extension(&self) -> &'static str {
        if self.gzip { "tar.gz" } else { "tar" }
    }

    fn full(&self, job: &BackupJob, limits: &RunLimits) -> Result<ExecutionResult> {
        let snapshot = snapshot_path_for(&job.artifact);
        if snapshot.exists() {
            // tar would silently run incremental against it
            return Err(ZipdirError::Precondition(format!(
                "snapshot {} already exists",
                snapshot.display()
            )));
        }
        self.create(job, &snapshot, limits)
    }

    fn differential(&self, job: &BackupJob, limits: &RunLimits) -> Result<ExecutionResult> {
        let base = job
            .base
            .as_ref()
            .ok_or_else(|| ZipdirError::Precondition("differential job without a base archive".into()))?;
        let base_snapshot = snapshot_path_for(base);
        if !base_snapshot.is_file() {
            return Err(ZipdirError::MissingArtifact(base_snapshot));
        }

        let list_path = job.source.join(&self.deleted_list_name);
        let previous_list = match fs::read(&list_path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let snapshot = snapshot_path_for(&job.artifact);
        fs::copy(&base_snapshot, &snapshot)?;
        debug!(from = %base_snapshot.display(), to = %snapshot.display(), "carried snapshot forward");

        let outcome = self
            .write_tombstones(job, base, &list_path, limits)
            .and_then(|_| self.create(job, &snapshot, limits));
        if outcome.is_err() {
            if let Err(e) = fs::remove_file(&snapshot) {
                warn!(path = %snapshot.display(), error = %e, "could not remove snapshot copy");
            }
            if let Err(e) = restore_list(&list_path, previous_list) {
                warn!(path = %list_path.display(), error = %e, "could not restore deleted list");
            }
        }
        outcome
    }
}

/// Put back the list a failed run replaced, or drop the one it created.
fn restore_list(path: &Path, previous: Option<Vec<u8>>) -> std::io::Result<()> {
    match previous {
        Some(content) => fs::write(path, content),
        None => match fs::remove_file(path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        },
    }
}
