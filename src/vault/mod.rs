//! # Vault Integration
//!
//! Authentication strategies, the shared authenticated session and PKI
//! certificate issuance.

pub mod auth;
pub mod error;
pub mod gcp;
pub mod session;
pub mod types;

pub use auth::{AppRoleSecret, AuthMethod};
pub use error::{AuthError, AuthErrorKind, IssueError};
pub use gcp::{GcpLogin, GcpMode};
pub use session::{BackendSession, SessionStatus, DEFAULT_REFRESH_INTERVAL};
pub use types::{IssuedMaterial, SecretString};
