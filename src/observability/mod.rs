//! # Observability Infrastructure
//!
//! Structured logging and Prometheus metrics for the certificate manager.

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::{install_recorder, CertificateMetrics};
