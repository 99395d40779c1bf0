use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FaxinaError>;

#[derive(Error, Debug)]
pub enum FaxinaError {
    #[error("access denied to {path}")]
    AccessDenied { path: PathBuf },

    #[error("unsupported target: {0}")]
    Unsupported(String),

    #[error("failed to read directory {path}: {message}")]
    ScanFailed { path: PathBuf, message: String },

    #[error("classifier error: {0}")]
    Classifier(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl FaxinaError {
    /// Maps an IO failure against `path` onto the scan taxonomy, keeping
    /// permission problems distinct from everything else.
    pub fn from_scan_io(path: &Path, err: &io::Error) -> Self {
        if err.kind() == io::ErrorKind::PermissionDenied {
            FaxinaError::AccessDenied {
                path: path.to_path_buf(),
            }
        } else {
            FaxinaError::ScanFailed {
                path: path.to_path_buf(),
                message: err.to_string(),
            }
        }
    }

    /// Conditions an interactive front end should raise as a blocking dialog
    /// instead of a transient status line.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            FaxinaError::AccessDenied { .. } | FaxinaError::Unsupported(_)
        )
    }
}
