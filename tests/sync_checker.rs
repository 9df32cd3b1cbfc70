//! SyncChecker against an in-process TLS endpoint.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use common::{generate, target, GeneratedCert};
use vault_cert_manager::certs::{fingerprint, HealthCheckTarget, ManagedCertificate, ParsedCertificate};
use vault_cert_manager::health::{is_out_of_sync, SyncChecker};

/// Serve `cert` over TLS on an ephemeral port until the test ends.
async fn serve_tls(cert: &GeneratedCert) -> SocketAddr {
    let config = rustls::ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(
        vec![CertificateDer::from(cert.cert_der.clone())],
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.key_der.clone())),
    )
    .unwrap();

    let acceptor = TlsAcceptor::from(Arc::new(config));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                if let Ok(mut tls) = acceptor.accept(stream).await {
                    let mut buf = [0u8; 64];
                    let _ = tls.read(&mut buf).await;
                }
            });
        }
    });

    addr
}

#[tokio::test]
async fn probe_returns_presented_fingerprint() {
    let served = generate("web.example.com", time::Duration::hours(24)).unwrap();
    let addr = serve_tls(&served).await;

    let checker = SyncChecker::new().unwrap();
    let result = checker.probe(&addr.to_string(), Duration::from_secs(5)).await;

    assert!(result.success, "probe failed: {:?}", result.error);
    assert_eq!(result.remote_fingerprint, Some(fingerprint(&served.cert_der)));
    assert_eq!(result.remote_fingerprint, Some(served.fingerprint()));
}

#[tokio::test]
async fn check_detects_divergence_from_disk() {
    let served = generate("web.example.com", time::Duration::hours(24)).unwrap();
    let on_disk = generate("web.example.com", time::Duration::hours(24)).unwrap();
    let addr = serve_tls(&served).await;

    let dir = TempDir::new().unwrap();
    let mut web = target(dir.path(), "web", Duration::from_secs(86_400), false);
    web.health_check =
        Some(HealthCheckTarget { endpoint: addr.to_string(), timeout: Duration::from_secs(5) });

    let mut managed = ManagedCertificate::new(web, Duration::ZERO);
    managed.current = Some(ParsedCertificate {
        not_before: chrono::Utc::now(),
        not_after: chrono::Utc::now() + chrono::Duration::hours(24),
        serial: "01".to_string(),
        fingerprint: on_disk.fingerprint(),
    });

    let checker = SyncChecker::new().unwrap();
    let result = checker.check(&managed).await;
    assert!(result.success);
    assert!(is_out_of_sync(managed.fingerprint(), result.remote_fingerprint.as_deref()));

    managed.current.as_mut().unwrap().fingerprint = served.fingerprint();
    let result = checker.check(&managed).await;
    assert!(!is_out_of_sync(managed.fingerprint(), result.remote_fingerprint.as_deref()));
}

#[tokio::test]
async fn plain_tcp_endpoint_reports_tls_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });

    let checker = SyncChecker::new().unwrap();
    let result = checker.probe(&addr.to_string(), Duration::from_secs(5)).await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("TLS connection failed"));
    assert!(result.remote_fingerprint.is_none());
}
