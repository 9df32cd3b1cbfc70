//! # Error Handling
//!
//! Crate-wide error type for the certificate manager. Subsystems keep their own
//! narrow error enums ([`AuthError`], [`IssueError`], [`StoreError`]) and convert
//! into [`Error`] at the boundary where failures are reported or logged.

pub mod store;

pub use store::StoreError;

use crate::vault::{AuthError, IssueError};

/// Custom result type for certificate manager operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the certificate manager
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid or ambiguous configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    ConfigInvalid(String),

    /// The backend session could not authenticate.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A single certificate issue/renew request failed.
    #[error(transparent)]
    Issue(#[from] IssueError),

    /// Reading or writing certificate material on disk failed.
    #[error(transparent)]
    Persistence(#[from] StoreError),

    /// Post-change command exited non-zero or could not be spawned.
    #[error("on_change command failed: {0}")]
    Hook(String),

    /// A target with the same name is already registered.
    #[error("certificate {0} already exists")]
    DuplicateTarget(String),

    /// No target with this name is registered.
    #[error("certificate {0} not found")]
    UnknownTarget(String),

    /// One or more targets failed during a forced rotation.
    #[error("rotation failed for {} certificate(s): {}", failed.len(), failed.join(", "))]
    RotationFailed { failed: Vec<String> },

    /// Peer discovery through the directory service failed.
    #[error("Service discovery failed: {0}")]
    Discovery(String),

    /// No discovered peer has this node name.
    #[error("Node not found: {0}")]
    UnknownPeer(String),

    /// Forwarding a request to a peer failed.
    #[error("Proxy request failed: {0}")]
    Proxy(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::ConfigInvalid(message.into())
    }

    /// Create a new hook error
    pub fn hook<S: Into<String>>(message: S) -> Self {
        Self::Hook(message.into())
    }

    /// Create a new discovery error
    pub fn discovery<S: Into<String>>(message: S) -> Self {
        Self::Discovery(message.into())
    }

    /// Create a new proxy error
    pub fn proxy<S: Into<String>>(message: S) -> Self {
        Self::Proxy(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP status code used when this error reaches an API caller.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::UnknownTarget(_) | Error::UnknownPeer(_) => 404,
            Error::DuplicateTarget(_) => 409,
            Error::ConfigInvalid(_) => 400,
            Error::Proxy(_) => 502,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_error_constructors() {
        let err = Error::config("vault.address is required");
        assert!(matches!(err, Error::ConfigInvalid(_)));
        assert_eq!(err.to_string(), "Configuration error: vault.address is required");

        let err = Error::discovery("consul returned status 503");
        assert!(err.to_string().contains("consul returned status 503"));
    }

    #[test]
    fn test_rotation_failed_lists_targets() {
        let err = Error::RotationFailed { failed: vec!["web".into(), "db".into()] };
        assert_eq!(err.to_string(), "rotation failed for 2 certificate(s): web, db");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::UnknownTarget("web".into()).status_code(), 404);
        assert_eq!(Error::UnknownPeer("node-a".into()).status_code(), 404);
        assert_eq!(Error::proxy("connection refused").status_code(), 502);
        assert_eq!(Error::hook("exit status 1").status_code(), 500);
    }

    #[test]
    fn test_store_error_converts_with_path() {
        let err: Error = StoreError::NotFound { path: PathBuf::from("/tmp/web.crt") }.into();
        assert!(err.to_string().contains("/tmp/web.crt"));
    }
}
