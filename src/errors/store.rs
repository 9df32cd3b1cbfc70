use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading or writing certificate material on disk.
///
/// Every variant names the path involved so the caller's log line is
/// actionable without extra context.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The certificate file does not exist.
    #[error("Certificate file {path} does not exist")]
    NotFound { path: PathBuf },

    /// The file exists but could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The first PEM block is missing, is not a CERTIFICATE, or does not parse.
    #[error("Failed to decode certificate in {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// A parent directory could not be created.
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing a certificate or key file failed.
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Path the failed operation was working on.
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::NotFound { path }
            | Self::Read { path, .. }
            | Self::Decode { path, .. }
            | Self::CreateDir { path, .. }
            | Self::Write { path, .. } => path,
        }
    }
}
