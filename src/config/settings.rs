use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, ZipdirError};

pub const DEFAULT_SENTINEL: &str = ".compress_dir";
pub const DEFAULT_DELETED_LIST: &str = ".deleted_list";
pub const DEFAULT_EXCLUDE: &str = r"^\.";
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Settings {
    /// Name of the zero-byte file that marks a directory for backup.
    pub sentinel_name: String,
    /// Name of the tombstone list written by tar differentials.
    pub deleted_list_name: String,
    /// Directory names matching this regex are never marked.
    pub exclude_pattern: String,
    /// strftime pattern used in artifact and log names.
    pub timestamp_format: String,
    pub compression_level: u8,
    pub backend: BackendKind,
    pub save_path: Option<PathBuf>,
    /// Where batch logs go; falls back to `save_path`.
    pub log_dir: Option<PathBuf>,
    pub tool_timeout_secs: Option<u64>,
    pub kill_grace_secs: u64,
    /// Program followed by leading arguments.
    pub sevenzip_command: Vec<String>,
    pub tar_command: Vec<String>,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sentinel_name: DEFAULT_SENTINEL.into(),
            deleted_list_name: DEFAULT_DELETED_LIST.into(),
            exclude_pattern: DEFAULT_EXCLUDE.into(),
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.into(),
            compression_level: 9,
            backend: BackendKind::SevenZip,
            save_path: None,
            log_dir: None,
            tool_timeout_secs: None,
            kill_grace_secs: 5,
            sevenzip_command: vec!["7za".into()],
            tar_command: vec!["tar".into()],
            log_level: "info".into(),
        }
    }
}

impl Settings {
    /// Reject values that would only blow up halfway through a batch.
    pub fn validate(&self) -> Result<()> {
        validate_timestamp_format(&self.timestamp_format)?;
        if self.compression_level > 9 {
            return Err(ZipdirError::Config(format!(
                "compression level {} out of range 0-9",
                self.compression_level
            )));
        }
        if self.sentinel_name.is_empty() || self.sentinel_name.contains(['/', '\\']) {
            return Err(ZipdirError::Config(format!(
                "invalid sentinel name '{}'",
                self.sentinel_name
            )));
        }
        if self.deleted_list_name.is_empty() || self.deleted_list_name.contains(['/', '\\']) {
            return Err(ZipdirError::Config(format!(
                "invalid deleted list name '{}'",
                self.deleted_list_name
            )));
        }
        if self.sevenzip_command.is_empty() || self.tar_command.is_empty() {
            return Err(ZipdirError::Config("tool command must name a program".into()));
        }
        regex::Regex::new(&self.exclude_pattern)
            .map_err(|e| ZipdirError::Config(format!("invalid exclude pattern: {}", e)))?;
        Ok(())
    }
}

/// chrono panics when formatting with a bad specifier, so check up front.
pub fn validate_timestamp_format(fmt: &str) -> Result<()> {
    if fmt.is_empty() {
        return Err(ZipdirError::Config("timestamp format is empty".into()));
    }
    if StrftimeItems::new(fmt).any(|item| matches!(item, Item::Error)) {
        return Err(ZipdirError::Config(format!("invalid timestamp format '{}'", fmt)));
    }
    if fmt.contains('/') {
        return Err(ZipdirError::Config(format!(
            "timestamp format '{}' would produce a path separator",
            fmt
        )));
    }
    Ok(())
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendKind {
    #[serde(rename = "7z")]
    #[value(name = "7z")]
    SevenZip,
    #[serde(rename = "tar")]
    #[value(name = "tar")]
    Tar,
    #[serde(rename = "tar.gz")]
    #[value(name = "tar.gz")]
    TarGz,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    Full,
    Differential,
}

impl BackupKind {
    /// Tag used inside artifact names.
    pub fn tag(self) -> &'static str {
        match self {
            BackupKind::Full => "base",
            BackupKind::Differential => "diff",
        }
    }

    /// Prefix used for batch log files.
    pub fn log_prefix(self) -> &'static str {
        match self {
            BackupKind::Full => "full_backup_log",
            BackupKind::Differential => "diff_backup_log",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: Settings = serde_json::from_str(r#"{"backend":"tar.gz","compression_level":3}"#).unwrap();
        assert_eq!(s.backend, BackendKind::TarGz);
        assert_eq!(s.compression_level, 3);
        assert_eq!(s.sentinel_name, ".compress_dir");
        assert_eq!(s.timestamp_format, "%Y%m%d-%H%M%S");
    }

    #[test]
    fn bad_timestamp_format_is_rejected() {
        assert!(validate_timestamp_format("%Y%Q").is_err());
        assert!(validate_timestamp_format("%Y/%m").is_err());
        assert!(validate_timestamp_format("").is_err());
        assert!(validate_timestamp_format("%Y%m%d-%H%M%S").is_ok());
    }

    #[test]
    fn bad_exclude_pattern_is_rejected() {
        let s = Settings { exclude_pattern: "(".into(), ..Settings::default() };
        assert!(matches!(s.validate(), Err(ZipdirError::Config(_))));
    }

    #[test]
    fn level_out_of_range_is_rejected() {
        let s = Settings { compression_level: 12, ..Settings::default() };
        assert!(s.validate().is_err());
    }
}
