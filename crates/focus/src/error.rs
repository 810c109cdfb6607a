//! Error types for focus mode

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by the focus library
#[derive(Error, Debug)]
pub enum FocusError {
    /// Malformed domain input, rejected before any I/O
    #[error("Invalid domain '{0}': expected a DNS name such as example.com")]
    InvalidDomain(String),

    /// Hosts file stayed busy through every retry
    #[error("Hosts file busy while running '{command}': {output}")]
    ToolTransient { command: String, output: String },

    /// The hosts tool ran and reported a failure
    #[error("'{command}' failed (exit {code:?}): {output}")]
    ToolFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    /// The hosts tool could not be started at all
    #[error("Could not run hosts tool '{tool}': {source}")]
    ToolUnavailable {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing a persisted file failed
    #[error("Failed to {op} {}: {source}", path.display())]
    Persistence {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted file exists but does not have a shape we understand
    #[error("Corrupt file {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// Legacy blocklist migration failed; the original file was restored
    #[error("Blocklist migration failed ({reason}); original restored from {}", backup.display())]
    Migration { reason: String, backup: PathBuf },
}

impl FocusError {
    pub(crate) fn io(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        FocusError::Persistence {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn corrupt(path: &Path, reason: impl ToString) -> Self {
        FocusError::Corrupt {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FocusError>;
