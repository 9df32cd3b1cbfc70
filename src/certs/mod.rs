//! # Managed Certificates
//!
//! Static targets, their runtime state, the on-disk store and the lifecycle
//! manager that decides when to renew.

pub mod manager;
pub mod service;
pub mod store;
pub mod view;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

pub use manager::{run_hooks, LifecycleManager, PendingHook};
pub use service::CertificateService;
pub use store::CertificateStore;
pub use view::CertificateView;

use crate::config::CertificateConfig;
use crate::health::CheckResult;
use crate::vault::{IssuedMaterial, IssueError};

/// Source of new certificate material. Implemented by the Vault session and by
/// test doubles.
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    async fn issue(&self, target: &CertificateTarget) -> Result<IssuedMaterial, IssueError>;
}

/// Hex SHA-256 of a certificate's DER bytes.
pub fn fingerprint(der: &[u8]) -> String {
    hex::encode(Sha256::digest(der))
}

/// TLS endpoint that should be presenting a target's certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckTarget {
    /// `host:port`
    pub endpoint: String,
    pub timeout: Duration,
}

/// What to request and where to write it. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct CertificateTarget {
    pub name: String,
    pub role: String,
    pub common_name: String,
    pub alt_names: Vec<String>,
    pub ip_sans: Vec<String>,
    pub ttl: Duration,
    pub certificate_path: PathBuf,
    pub key_path: PathBuf,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub on_change: Option<String>,
    pub health_check: Option<HealthCheckTarget>,
}

impl CertificateTarget {
    /// Certificate and key share one file iff both paths are byte-identical.
    pub fn is_combined(&self) -> bool {
        self.certificate_path.as_os_str() == self.key_path.as_os_str()
    }
}

impl From<&CertificateConfig> for CertificateTarget {
    fn from(config: &CertificateConfig) -> Self {
        Self {
            name: config.name.clone(),
            role: config.role.clone(),
            common_name: config.common_name.clone(),
            alt_names: config.alt_names.clone(),
            ip_sans: config.ip_sans.clone(),
            ttl: config.ttl,
            certificate_path: config.certificate.clone(),
            key_path: config.key.clone(),
            owner: config.owner.clone().filter(|o| !o.is_empty()),
            group: config.group.clone().filter(|g| !g.is_empty()),
            on_change: config.on_change.clone().filter(|c| !c.trim().is_empty()),
            health_check: config.health_check.as_ref().map(|check| HealthCheckTarget {
                endpoint: check.tcp.clone(),
                timeout: if check.timeout.is_zero() {
                    crate::config::DEFAULT_HEALTH_TIMEOUT
                } else {
                    check.timeout
                },
            }),
        }
    }
}

/// A certificate as parsed from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCertificate {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub serial: String,
    pub fingerprint: String,
}

/// Runtime state paired with one target.
#[derive(Debug, Clone)]
pub struct ManagedCertificate {
    pub target: CertificateTarget,
    pub current: Option<ParsedCertificate>,
    pub last_renewed: Option<DateTime<Utc>>,
    pub next_renewal: Option<DateTime<Utc>>,
    /// Fixed at registration, in `[0, 1h)`.
    pub jitter: Duration,
    /// Outcome of the most recent sync probe.
    pub last_check: Option<CheckResult>,
}

impl ManagedCertificate {
    pub fn new(target: CertificateTarget, jitter: Duration) -> Self {
        Self {
            target,
            current: None,
            last_renewed: None,
            next_renewal: None,
            jitter,
            last_check: None,
        }
    }

    /// `notAfter - ttl/3 - jitter`, or `None` before anything was loaded.
    pub fn renewal_deadline(&self) -> Option<DateTime<Utc>> {
        let current = self.current.as_ref()?;
        let margin = chrono::Duration::from_std(self.target.ttl / 3 + self.jitter).ok()?;
        current.not_after.checked_sub_signed(margin)
    }

    /// A certificate that was never loaded is not due; the missing-file check
    /// covers it.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.renewal_deadline().is_some_and(|deadline| now >= deadline)
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.current.as_ref().map(|c| c.fingerprint.as_str())
    }
}
