//! # REST API Components
//!
//! Certificate status model and the per-instance HTTP control surface:
//! status, manual rotation, Prometheus metrics and a liveness probe.

pub mod error;
pub mod server;
pub mod status;

pub use error::ApiError;
pub use server::{build_router, serve, serve_listener, ApiState};
pub use status::{CertStatus, StatusLabel};
