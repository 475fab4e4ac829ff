use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ZipdirError {
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("`{command}` exited with {}: {}", code_label(.code), .stderr.trim())]
    ExternalTool {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("missing artifact: {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("`{command}` timed out after {secs}s and was killed")]
    Timeout { command: String, secs: u64 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

fn code_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {}", c),
        None => "no status (terminated by signal)".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, ZipdirError>;
