use super::{ArchiveBackend, BackupJob, ExecutionResult, RunLimits, sevenzip::SevenZipBackend, tar::TarBackend};
use crate::config::{BackendKind, Settings};
use crate::error::Result;

/// The archivers we know how to drive.
pub enum Backend {
    SevenZip(SevenZipBackend),
    Tar(TarBackend),
}

impl Backend {
    pub fn select(kind: BackendKind, settings: &Settings) -> Self {
        match kind {
            BackendKind::SevenZip => Backend::SevenZip(SevenZipBackend::new(settings.sevenzip_command.clone())),
            BackendKind::Tar => Backend::Tar(TarBackend::new(
                settings.tar_command.clone(),
                false,
                settings.deleted_list_name.clone(),
            )),
            BackendKind::TarGz => Backend::Tar(TarBackend::new(
                settings.tar_command.clone(),
                true,
                settings.deleted_list_name.clone(),
            )),
        }
    }

    fn inner(&self) -> &dyn ArchiveBackend {
        match self {
            Backend::SevenZip(b) => b,
            Backend::Tar(b) => b,
        }
    }
}

impl ArchiveBackend for Backend {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn extension(&self) -> &'static str {
        self.inner().extension()
    }

    fn full(&self, job: &BackupJob, limits: &RunLimits) -> Result<ExecutionResult> {
        self.inner().full(job, limits)
    }

    fn differential(&self, job: &BackupJob, limits: &RunLimits) -> Result<ExecutionResult> {
        self.inner().differential(job, limits)
    }
}
