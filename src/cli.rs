use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::BackendKind;

/// zipdir: mark directories and back them up with 7-zip or tar
#[derive(Parser, Debug)]
#[command(name = "zipdir", version, about = "Mark directories for backup and archive them with external tools.", long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Settings file (defaults to ~/.zipdir/config.json when present)
    #[arg(short = 'c', long = "config", global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Mark directories under a root using one selection policy
    Mark {
        /// Directory to scan
        root: PathBuf,
        /// Which directories to select
        #[arg(short = 'p', long, value_enum, default_value_t = MarkPolicy::TopLevel)]
        policy: MarkPolicy,
        /// Minimum number of entries for the threshold policy
        #[arg(short = 'm', long = "max-entries", required_if_eq("policy", "threshold"))]
        max_entries: Option<usize>,
        /// Regex of directory names to skip (default: names starting with '.')
        #[arg(short = 'x', long)]
        exclude: Option<String>,
    },

    /// Mark the given directories
    MarkPaths {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Remove every mark under a root
    Unmark {
        root: PathBuf,
    },

    /// List marked directories under a root
    List {
        root: PathBuf,
    },

    /// Create full backups
    Full {
        #[command(flatten)]
        args: BackupArgs,
    },

    /// Create differential backups against existing full backups
    Diff {
        #[command(flatten)]
        args: BackupArgs,
        /// Base archives, one per line, paired by position with the --from directories
        #[arg(long = "bases", value_name = "FILE", requires = "from")]
        bases: Option<PathBuf>,
    },

    /// Print CLI version
    Version,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkPolicy {
    /// Immediate children of the root
    TopLevel,
    /// Directories without subdirectories
    Leaves,
    /// Directories with at least --max-entries entries
    Threshold,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct Source {
    /// Plain-text list of directories (diff: `<dir>\t<base archive>` per line)
    #[arg(short = 'f', long = "from", value_name = "FILE")]
    pub from: Option<PathBuf>,
    /// Back up every marked directory under this root
    #[arg(long = "marked", value_name = "ROOT")]
    pub marked: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct BackupArgs {
    #[command(flatten)]
    pub source: Source,
    /// Archiver to use
    #[arg(short = 'b', long, value_enum)]
    pub backend: Option<BackendKind>,
    /// Where archives are written
    #[arg(short = 'o', long = "save-path", value_name = "DIR")]
    pub save_path: Option<PathBuf>,
    /// strftime pattern for artifact timestamps
    #[arg(long = "format")]
    pub timestamp_format: Option<String>,
    /// Compression level 0-9
    #[arg(long = "level")]
    pub compression_level: Option<u8>,
    /// Kill the archiver after this many seconds
    #[arg(long = "timeout", value_name = "SECS")]
    pub timeout_secs: Option<u64>,
}
