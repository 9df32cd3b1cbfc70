//! # Metrics Collection
//!
//! Prometheus gauges and counters describing the managed certificates.

use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::certs::ManagedCertificate;
use crate::errors::{Error, Result};

/// Install the Prometheus recorder and return the handle used to render
/// `/metrics`. The exporter does not listen on its own; the HTTP surface
/// serves the rendered text.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::internal(format!("Failed to install metrics recorder: {}", e)))?;

    describe_metrics();
    tracing::info!("Prometheus metrics recorder installed");
    Ok(handle)
}

fn describe_metrics() {
    describe_counter!(
        "managed_cert_renewals_total",
        Unit::Count,
        "Certificate issue and renewal attempts by outcome"
    );
    describe_gauge!(
        "managed_cert_last_renewed_timestamp_seconds",
        Unit::Seconds,
        "Unix time of the last successful renewal"
    );
    describe_gauge!(
        "managed_cert_not_before_timestamp_seconds",
        Unit::Seconds,
        "notBefore of the certificate on disk"
    );
    describe_gauge!(
        "managed_cert_not_after_timestamp_seconds",
        Unit::Seconds,
        "notAfter of the certificate on disk"
    );
    describe_gauge!(
        "managed_cert_fingerprint_info",
        "SHA-256 fingerprint of the certificate on disk and the one presented by the service"
    );
}

/// Records certificate state through the `metrics` facade.
#[derive(Debug, Clone, Default)]
pub struct CertificateMetrics;

impl CertificateMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Count one issue/renew attempt.
    pub fn record_renewal(&self, name: &str, success: bool) {
        let status = if success { "success" } else { "failure" };
        let labels = [("name", name.to_string()), ("status", status.to_string())];
        counter!("managed_cert_renewals_total", &labels).increment(1);
    }

    /// Refresh every gauge derived from `managed`.
    pub fn update_certificate(&self, managed: &ManagedCertificate) {
        let name = managed.target.name.clone();
        let labels = [("name", name.clone())];

        if let Some(last_renewed) = managed.last_renewed {
            gauge!("managed_cert_last_renewed_timestamp_seconds", &labels)
                .set(last_renewed.timestamp() as f64);
        }

        let Some(current) = &managed.current else {
            return;
        };

        gauge!("managed_cert_not_before_timestamp_seconds", &labels)
            .set(current.not_before.timestamp() as f64);
        gauge!("managed_cert_not_after_timestamp_seconds", &labels)
            .set(current.not_after.timestamp() as f64);

        let disk = [
            ("name", name.clone()),
            ("fingerprint", current.fingerprint.clone()),
            ("location", "disk".to_string()),
        ];
        gauge!("managed_cert_fingerprint_info", &disk).set(1.0);

        if let Some(remote) = managed.last_check.as_ref().and_then(|c| c.remote_fingerprint.clone())
        {
            let memory =
                [("name", name), ("fingerprint", remote), ("location", "memory".to_string())];
            gauge!("managed_cert_fingerprint_info", &memory).set(1.0);
        }
    }
}
