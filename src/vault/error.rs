//! Error types for Vault authentication and certificate issuance.

use std::fmt;

use thiserror::Error;

/// Failure class of an authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// Local material (key file, credentials, identity) is missing or unusable.
    ConfigInvalid,
    /// The login or token endpoint could not be reached.
    NetworkFailure,
    /// Vault or the token endpoint answered but refused the login.
    BackendRejected,
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AuthErrorKind::ConfigInvalid => "invalid auth configuration",
            AuthErrorKind::NetworkFailure => "network failure",
            AuthErrorKind::BackendRejected => "rejected by backend",
        };
        f.write_str(label)
    }
}

/// Authentication failed. No strategy retries internally.
#[derive(Debug, Error)]
#[error("Authentication failed ({kind}): {message}")]
pub struct AuthError {
    pub kind: AuthErrorKind,
    pub message: String,
}

impl AuthError {
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self { kind: AuthErrorKind::ConfigInvalid, message: message.into() }
    }

    pub fn network_failure(message: impl Into<String>) -> Self {
        Self { kind: AuthErrorKind::NetworkFailure, message: message.into() }
    }

    pub fn backend_rejected(message: impl Into<String>) -> Self {
        Self { kind: AuthErrorKind::BackendRejected, message: message.into() }
    }

    /// Classify a reqwest failure from a login or token exchange.
    pub(crate) fn from_transport(context: &str, err: reqwest::Error) -> Self {
        if err.is_status() {
            Self::backend_rejected(format!("{}: {}", context, err))
        } else {
            Self::network_failure(format!("{}: {}", context, err))
        }
    }
}

/// A single issue request failed.
#[derive(Debug, Error)]
pub enum IssueError {
    /// The session's token was refused.
    #[error("Vault rejected the session token: {message}")]
    Unauthenticated { message: String },

    /// Vault or the transport failed the request.
    #[error("Vault PKI certificate generation failed: {message}")]
    Backend { message: String },

    /// The response was missing required material.
    #[error("Invalid PKI response: {reason}")]
    InvalidResponse { reason: String },
}

impl IssueError {
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated { message: message.into() }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend { message: message.into() }
    }

    pub fn invalid_response(reason: impl Into<String>) -> Self {
        Self::InvalidResponse { reason: reason.into() }
    }
}

impl From<vaultrs::error::ClientError> for IssueError {
    fn from(err: vaultrs::error::ClientError) -> Self {
        match &err {
            vaultrs::error::ClientError::APIError { code: 401 | 403, .. } => {
                Self::unauthenticated(err.to_string())
            }
            _ => Self::backend(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_constructors() {
        let err = AuthError::config_invalid("secret_id_file unreadable");
        assert_eq!(err.kind, AuthErrorKind::ConfigInvalid);
        assert!(err.to_string().contains("secret_id_file unreadable"));

        let err = AuthError::backend_rejected("permission denied");
        assert_eq!(err.kind, AuthErrorKind::BackendRejected);
        assert!(err.to_string().contains("rejected by backend"));
    }

    #[test]
    fn test_issue_error_from_api_error() {
        let err: IssueError = vaultrs::error::ClientError::APIError {
            code: 403,
            errors: vec!["permission denied".to_string()],
        }
        .into();
        assert!(matches!(err, IssueError::Unauthenticated { .. }));

        let err: IssueError = vaultrs::error::ClientError::APIError {
            code: 400,
            errors: vec!["unknown role".to_string()],
        }
        .into();
        assert!(matches!(err, IssueError::Backend { .. }));
    }
}
