//! # Sync Checking
//!
//! Connects to the TLS endpoint a target is deployed on and fingerprints the
//! certificate it presents, so callers can compare it with what was written
//! to disk. Chain validation is skipped; identity is established
//! by fingerprint equality.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::Instrument;

use crate::certs::{fingerprint, ManagedCertificate};
use crate::config::DEFAULT_HEALTH_TIMEOUT;
use crate::errors::{Error, Result};

/// Outcome of one probe. Never an error: failures are reported in `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Fingerprint of the presented leaf; `None` if not configured or no
    /// certificate was obtained.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_fingerprint: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl CheckResult {
    fn not_configured() -> Self {
        Self { success: true, error: None, remote_fingerprint: None, checked_at: Utc::now() }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            remote_fingerprint: None,
            checked_at: Utc::now(),
        }
    }

    fn presented(fingerprint: String) -> Self {
        Self {
            success: true,
            error: None,
            remote_fingerprint: Some(fingerprint),
            checked_at: Utc::now(),
        }
    }
}

/// Disk and remote fingerprints differ, both being known.
pub fn is_out_of_sync(disk: Option<&str>, remote: Option<&str>) -> bool {
    match (disk, remote) {
        (Some(disk), Some(remote)) if !disk.is_empty() && !remote.is_empty() => disk != remote,
        _ => false,
    }
}

/// Probes TLS endpoints without verifying the presented chain.
#[derive(Clone)]
pub struct SyncChecker {
    connector: TlsConnector,
}

impl SyncChecker {
    pub fn new() -> Result<Self> {
        let provider = Arc::new(ring::default_provider());
        let verifier = Arc::new(AcceptAnyServerCert { provider: Arc::clone(&provider) });

        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::internal(format!("failed to build TLS client config: {}", e)))?
            .dangerous()
            .with_custom_certificate_verifier(verifier)
            .with_no_client_auth();

        Ok(Self { connector: TlsConnector::from(Arc::new(config)) })
    }

    /// Probe the endpoint configured for `managed`, if any.
    pub async fn check(&self, managed: &ManagedCertificate) -> CheckResult {
        match &managed.target.health_check {
            None => CheckResult::not_configured(),
            Some(check) if check.endpoint.trim().is_empty() => CheckResult::not_configured(),
            Some(check) => {
                let span = crate::probe_span!(managed.target.name, check.endpoint);
                let result = self.probe(&check.endpoint, check.timeout).instrument(span).await;
                if let Some(error) = &result.error {
                    tracing::debug!(
                        certificate = %managed.target.name,
                        endpoint = %check.endpoint,
                        error = %error,
                        "Health check failed"
                    );
                }
                result
            }
        }
    }

    /// Connect to `endpoint` (`host:port`) and fingerprint the presented leaf.
    pub async fn probe(&self, endpoint: &str, timeout: Duration) -> CheckResult {
        let timeout = if timeout.is_zero() { DEFAULT_HEALTH_TIMEOUT } else { timeout };

        match tokio::time::timeout(timeout, self.fetch_leaf(endpoint)).await {
            Ok(Ok(der)) => CheckResult::presented(fingerprint(&der)),
            Ok(Err(error)) => CheckResult::failed(error),
            Err(_) => CheckResult::failed(format!(
                "timed out after {}ms connecting to {}",
                timeout.as_millis(),
                endpoint
            )),
        }
    }

    async fn fetch_leaf(&self, endpoint: &str) -> std::result::Result<Vec<u8>, String> {
        let host = endpoint_host(endpoint)?;
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| format!("invalid server name {}: {}", host, e))?;

        let tcp = TcpStream::connect(endpoint)
            .await
            .map_err(|e| format!("TCP connection failed: {}", e))?;

        let tls = self
            .connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| format!("TLS connection failed: {}", e))?;

        let (_, connection) = tls.get_ref();
        connection
            .peer_certificates()
            .and_then(|certs| certs.first())
            .map(|leaf| leaf.as_ref().to_vec())
            .ok_or_else(|| "no certificates received from server".to_string())
    }
}

/// Host part of `host:port` or `[v6]:port`.
fn endpoint_host(endpoint: &str) -> std::result::Result<&str, String> {
    let (host, port) = endpoint
        .rsplit_once(':')
        .ok_or_else(|| format!("endpoint {} must be host:port", endpoint))?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(format!("endpoint {} must be host:port", endpoint));
    }
    Ok(host.trim_start_matches('[').trim_end_matches(']'))
}

/// Accepts whatever certificate the server presents. Handshake signatures are
/// still checked so the peer must hold the presented key.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}
