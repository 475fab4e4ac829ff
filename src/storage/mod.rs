use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::BackupKind;
use crate::drivers::ExecutionResult;
use crate::error::{Result, ZipdirError};

/// `<folder>.<timestamp>.<base|diff>.<ext>`
pub fn artifact_name(folder: &str, timestamp: &str, kind: BackupKind, ext: &str) -> String {
    format!("{}.{}.{}.{}", folder, timestamp, kind.tag(), ext)
}

pub fn log_file_name(kind: BackupKind, timestamp: &str) -> String {
    format!("{}.{}.txt", kind.log_prefix(), timestamp)
}

/// The incremental-state file paired with a tar artifact:
/// `x.ts.base.tar.gz` -> `x.ts.base.snar`.
pub fn snapshot_path_for(archive: &Path) -> PathBuf {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = name
        .strip_suffix(".tar.gz")
        .or_else(|| name.strip_suffix(".tar"))
        .unwrap_or(&name);
    archive.with_file_name(format!("{}.snar", stem))
}

/// Newest `<folder>.*.base.<ext>` in `save_path`, by modification time.
pub fn latest_base_artifact(save_path: &Path, folder: &str, ext: &str) -> Result<Option<PathBuf>> {
    let prefix = format!("{}.", folder);
    let suffix = format!(".{}.{}", BackupKind::Full.tag(), ext);
    let mut best: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(save_path)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !(name.starts_with(&prefix) && name.ends_with(&suffix)) || name.len() <= prefix.len() + suffix.len() {
            continue;
        }
        // the timestamp part must not contain further dots, else "a.b" would match folder "a"
        let middle = &name[prefix.len()..name.len() - suffix.len()];
        if middle.contains('.') {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if best.as_ref().map(|(t, _)| modified > *t).unwrap_or(true) {
            best = Some((modified, entry.path()));
        }
    }
    Ok(best.map(|(_, p)| p))
}

/// Append-only log holding one line per processed directory.
pub struct BatchLog {
    path: PathBuf,
    file: File,
    lines: usize,
}

impl BatchLog {
    pub fn create(dir: &Path, kind: BackupKind, timestamp: &str) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(log_file_name(kind, timestamp));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file, lines: 0 })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn record(&mut self, dir: &Path, result: &ExecutionResult) -> Result<()> {
        let code = result.code.map(|c| c.to_string()).unwrap_or_else(|| "-".into());
        writeln!(self.file, "{}\t{}\t{}", dir.display(), code, single_line(&result.stdout))?;
        self.file.flush()?;
        self.lines += 1;
        Ok(())
    }
}

fn single_line(output: &str) -> String {
    output.trim_end().replace('\r', "").replace('\n', "\\n")
}

/// Folder name of a source directory, as used in artifact names.
pub fn folder_name(dir: &Path) -> Result<String> {
    dir.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty() && n != "..")
        .ok_or_else(|| ZipdirError::Precondition(format!("{} has no folder name", dir.display())))
}
