//! # vault-cert-manager
//!
//! Keeps X.509 certificates issued by a Vault PKI engine fresh on disk.
//!
//! ```text
//! Config → BackendSession (auth + token refresh) → LifecycleManager → CertificateStore
//!                                                        ↓
//!                          SyncChecker (TLS probe) → metrics / HTTP status → FleetAggregator
//! ```
//!
//! - **vault**: authentication strategies and the shared authenticated session
//! - **certs**: targets, renewal scheduling and on-disk material
//! - **health**: fingerprints the certificate a live endpoint presents
//! - **api** / **fleet**: per-instance HTTP surface and the fleet-wide aggregator

pub mod api;
pub mod app;
pub mod certs;
pub mod cli;
pub mod config;
pub mod errors;
pub mod fleet;
pub mod health;
pub mod observability;
pub mod vault;

pub use app::App;
pub use config::AppConfig;
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
