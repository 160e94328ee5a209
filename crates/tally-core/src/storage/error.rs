//! Local snapshot errors
//!
//! Every I/O failure records which step of snapshot handling it hit, so the
//! message names the operation as well as the file.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Step of snapshot handling that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStep {
    /// Reading the snapshot file
    Read,
    /// Creating the data directory
    CreateDir,
    /// Writing the temporary file
    Write,
    /// Renaming the temporary file over the snapshot
    Replace,
}

impl fmt::Display for SnapshotStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SnapshotStep::Read => "read",
            SnapshotStep::CreateDir => "create directory",
            SnapshotStep::Write => "write",
            SnapshotStep::Replace => "replace",
        })
    }
}

/// Errors from the local snapshot store
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Permission denied: cannot {step} '{path}'")]
    PermissionDenied {
        step: SnapshotStep,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No space left to {step} '{path}'")]
    NoSpace {
        step: SnapshotStep,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Could not {step} '{path}': {source}")]
    Io {
        step: SnapshotStep,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file exists but is not a tracker snapshot
    #[error("Snapshot '{path}' is not valid tracker data: {details}")]
    Corrupt { path: PathBuf, details: String },

    #[error("Could not encode tracker state: {0}")]
    Encode(#[source] serde_json::Error),
}

impl StorageError {
    /// Wrap an I/O error, classifying permission and disk-space failures
    pub fn io(step: SnapshotStep, path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        if source.kind() == io::ErrorKind::PermissionDenied {
            StorageError::PermissionDenied { step, path, source }
        } else if is_out_of_space(&source) {
            StorageError::NoSpace { step, path, source }
        } else {
            StorageError::Io { step, path, source }
        }
    }

    /// File the error refers to, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            StorageError::PermissionDenied { path, .. }
            | StorageError::NoSpace { path, .. }
            | StorageError::Io { path, .. }
            | StorageError::Corrupt { path, .. } => Some(path),
            StorageError::Encode(_) => None,
        }
    }

    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StorageError::NoSpace { .. } => Some("Free up disk space and try again."),
            StorageError::PermissionDenied { .. } => {
                Some("Check permissions on the data directory, or set TALLY_DATA_DIR.")
            }
            StorageError::Corrupt { .. } => {
                Some("Move the snapshot aside to start fresh, or import a previous export.")
            }
            _ => None,
        }
    }
}

fn is_out_of_space(error: &io::Error) -> bool {
    let msg = error.to_string().to_lowercase();
    msg.contains("no space left") || msg.contains("quota exceeded")
}

pub type StorageResult<T> = Result<T, StorageError>;
