//! Error types for system collaborator operations
//!
//! These are apply-time errors: the scheduler recovers them into per-resource
//! Failed status, so they carry enough context to be read straight out of a
//! run report.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from the node's package manager, filesystem or process execution
#[derive(Debug, Error)]
pub enum Error {
    /// The package manager rejected or failed an operation
    #[error("package manager error: {message}")]
    PackageManager {
        /// What was attempted
        message: String,
        /// Standard error output from the failed command
        stderr: String,
    },

    /// No supported package manager on this node
    #[error("no supported package manager found (tried apt-get, dnf)")]
    PkgToolNotFound,

    /// Filesystem probe or mutation failed
    #[error("filesystem error on {}: {message}", .path.display())]
    Filesystem { path: PathBuf, message: String },

    /// A one-shot command exited non-zero
    #[error("command failed: {command}: {stderr}")]
    Command { command: String, stderr: String },

    /// User or group name did not resolve to a uid/gid
    #[error("unknown user or group: {0}")]
    UnknownPrincipal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn fs(path: &Path, message: impl Into<String>) -> Self {
        Self::Filesystem {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Result type for collaborator operations
pub type Result<T> = std::result::Result<T, Error>;
