use super::{ArchiveBackend, BackupJob, ExecutionResult, RunLimits, ToolCommand};
use crate::error::{Result, ZipdirError};

/// Update actions for `7za u`: new and changed files are compressed, removed
/// files become anti-items, and everything goes to the archive after the `!`.
/// Together with `-u-` the base archive itself is left untouched.
const DIFF_UPDATE_SWITCH: &str = "-up0q3r2x2y2z0w2!";

pub struct SevenZipBackend {
    command: Vec<String>,
}

impl SevenZipBackend {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    fn level(job: &BackupJob) -> String {
        format!("-mx={}", job.compression_level)
    }
}

impl ArchiveBackend for SevenZipBackend {
    fn name(&self) -> &'static str { "7z" }

    fn extension(&self) -> &'static str { "7z" }

    fn full(&self, job: &BackupJob, limits: &RunLimits) -> Result<ExecutionResult> {
        ToolCommand::new(&self.command)?
            .arg("a")?
            .arg("-t7z")?
            .arg(Self::level(job))?
            .arg(&job.artifact)?
            .arg(&job.source)?
            .run(limits)
    }

    fn differential(&self, job: &BackupJob, limits: &RunLimits) -> Result<ExecutionResult> {
        let base = job
            .base
            .as_ref()
            .ok_or_else(|| ZipdirError::Precondition("differential job without a base archive".into()))?;
        let mut target = std::ffi::OsString::from(DIFF_UPDATE_SWITCH);
        target.push(&job.artifact);

        ToolCommand::new(&self.command)?
            .arg("u")?
            .arg(base)?
            .arg("-ms=off")?
            .arg(Self::level(job))?
            .arg("-t7z")?
            .arg("-u-")?
            .arg(target)?
            .arg(&job.source)?
            .run(limits)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::BackupKind;
    use std::path::PathBuf;

    /// Echoes its arguments one per line.
    fn echo_backend() -> SevenZipBackend {
        SevenZipBackend::new(vec!["sh".into(), "-c".into(), "for a in \"$@\"; do echo \"$a\"; done".into(), "7za".into()])
    }

    fn job(kind: BackupKind, base: Option<&str>, artifact: &str) -> BackupJob {
        BackupJob {
            source: PathBuf::from("/data/docs"),
            folder_name: "docs".into(),
            kind,
            base: base.map(PathBuf::from),
            artifact: PathBuf::from(artifact),
            compression_level: 7,
            timestamp: "20240101-000000".into(),
        }
    }

    #[test]
    fn full_argument_order() {
        let j = job(BackupKind::Full, None, "/bk/docs.20240101-000000.base.7z");
        let out = echo_backend().full(&j, &RunLimits::default()).unwrap();
        let args: Vec<&str> = out.stdout.lines().collect();
        assert_eq!(args, vec!["a", "-t7z", "-mx=7", "/bk/docs.20240101-000000.base.7z", "/data/docs"]);
    }

    #[test]
    fn differential_argument_order() {
        let j = job(
            BackupKind::Differential,
            Some("/bk/docs.1.base.7z"),
            "/bk/docs.20240101-000000.diff.7z",
        );
        let out = echo_backend().differential(&j, &RunLimits::default()).unwrap();
        let args: Vec<&str> = out.stdout.lines().collect();
        assert_eq!(
            args,
            vec![
                "u",
                "/bk/docs.1.base.7z",
                "-ms=off",
                "-mx=7",
                "-t7z",
                "-u-",
                "-up0q3r2x2y2z0w2!/bk/docs.20240101-000000.diff.7z",
                "/data/docs",
            ]
        );
    }
}
