//! # Structured Logging
//!
//! Subscriber initialisation and the span macros used around per-target work
//! and sync probes.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::LoggingConfig;
use crate::errors::{Error, Result};

/// Create a span for work on one managed certificate.
///
/// ```rust,ignore
/// let span = target_span!("web");
/// let span = target_span!("web", trigger = "manual");
/// ```
#[macro_export]
macro_rules! target_span {
    ($name:expr) => {
        tracing::info_span!(
            "certificate",
            certificate = %$name,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!(
            "certificate",
            certificate = %$name,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a span for one TLS sync probe.
#[macro_export]
macro_rules! probe_span {
    ($name:expr, $endpoint:expr) => {
        tracing::debug_span!(
            "sync_probe",
            certificate = %$name,
            endpoint = %$endpoint
        )
    };
}

/// Install the global subscriber. `RUST_LOG`, when set, overrides `level`.
///
/// A second call (e.g. from tests) leaves the existing subscriber in place.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::try_new(directives)
            .map_err(|e| Error::config(format!("invalid RUST_LOG: {}", e)))?,
        _ => EnvFilter::try_new(&config.level)
            .map_err(|e| Error::config(format!("invalid logging.level: {}", e)))?,
    };

    let installed = match config.format.as_str() {
        "json" => tracing::subscriber::set_global_default(
            FmtSubscriber::builder().with_env_filter(filter).json().finish(),
        ),
        _ => tracing::subscriber::set_global_default(
            FmtSubscriber::builder().with_env_filter(filter).finish(),
        ),
    };

    if let Err(e) = installed {
        tracing::debug!(error = %e, "Global subscriber already installed, keeping it");
    }
    Ok(())
}
