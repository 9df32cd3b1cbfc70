//! Shared fixtures: real X.509 material from rcgen and an in-memory issuer.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use rcgen::{CertificateParams, DnType, KeyPair};
use sha2::{Digest, Sha256};

use vault_cert_manager::certs::{CertificateIssuer, CertificateTarget};
use vault_cert_manager::vault::{IssueError, IssuedMaterial, SecretString};

/// A self-signed certificate with its key.
pub struct GeneratedCert {
    pub cert_pem: String,
    pub key_pem: String,
    pub cert_der: Vec<u8>,
    pub key_der: Vec<u8>,
}

impl GeneratedCert {
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.cert_der))
    }
}

/// Self-signed certificate for `common_name`, valid from one minute ago for `valid_for`.
pub fn generate(common_name: &str, valid_for: time::Duration) -> anyhow::Result<GeneratedCert> {
    let mut params =
        CertificateParams::new(vec![common_name.to_string(), "localhost".to_string()])
            .context("build certificate params")?;
    params.distinguished_name.push(DnType::CommonName, common_name);

    let now = time::OffsetDateTime::now_utc();
    params.not_before = now - time::Duration::minutes(1);
    params.not_after = now + valid_for;

    let key_pair = KeyPair::generate().context("generate key pair")?;
    let cert = params.self_signed(&key_pair).context("self-sign certificate")?;

    Ok(GeneratedCert {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
        cert_der: cert.der().to_vec(),
        key_der: key_pair.serialize_der(),
    })
}

/// Target writing under `dir`; `combined` puts certificate and key in one file.
pub fn target(dir: &Path, name: &str, ttl: Duration, combined: bool) -> CertificateTarget {
    let certificate_path = dir.join(format!("{}.crt", name));
    CertificateTarget {
        name: name.to_string(),
        role: format!("{}-role", name),
        common_name: format!("{}.example.com", name),
        alt_names: vec![],
        ip_sans: vec![],
        ttl,
        key_path: if combined { certificate_path.clone() } else { dir.join(format!("{}.key", name)) },
        certificate_path,
        owner: None,
        group: None,
        on_change: None,
        health_check: None,
    }
}

/// Issues fresh self-signed material valid for the requested ttl, and records calls.
#[derive(Default)]
pub struct MockIssuer {
    calls: AtomicUsize,
    failing: Mutex<HashSet<String>>,
    issued: Mutex<Vec<(String, String)>>,
    delay: Option<Duration>,
}

impl MockIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every issuance for `delay`, like a slow Vault.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail_for(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fingerprint of the last certificate issued for `name`.
    pub fn last_fingerprint(&self, name: &str) -> Option<String> {
        self.issued
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(issued_for, _)| issued_for == name)
            .map(|(_, fp)| fp.clone())
    }
}

#[async_trait]
impl CertificateIssuer for MockIssuer {
    async fn issue(&self, target: &CertificateTarget) -> Result<IssuedMaterial, IssueError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(&target.name) {
            return Err(IssueError::backend(format!("role {} is disabled", target.role)));
        }

        let valid_for = time::Duration::seconds(target.ttl.as_secs() as i64);
        let generated = generate(&target.common_name, valid_for)
            .map_err(|e| IssueError::backend(e.to_string()))?;

        self.issued.lock().unwrap().push((target.name.clone(), generated.fingerprint()));

        Ok(IssuedMaterial {
            certificate: generated.cert_pem,
            private_key: SecretString::new(generated.key_pem),
            ca_chain: None,
            serial_number: None,
            expires_at: None,
        })
    }
}
