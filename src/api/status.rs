//! Status model served at `/api/status` and consumed by the fleet aggregator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::certs::ManagedCertificate;
use crate::health::is_out_of_sync;

const CRITICAL_DAYS: i64 = 7;
const EXPIRING_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLabel {
    Healthy,
    Expiring,
    Critical,
    Unknown,
}

impl StatusLabel {
    /// Label for a certificate with `days_left` whole days of validity.
    pub fn from_days_left(days_left: i64) -> Self {
        if days_left <= CRITICAL_DAYS {
            StatusLabel::Critical
        } else if days_left <= EXPIRING_DAYS {
            StatusLabel::Expiring
        } else {
            StatusLabel::Healthy
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertStatus {
    pub name: String,
    pub common_name: String,
    #[serde(default)]
    pub not_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub days_left: i64,
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default, alias = "memory_fingerprint", skip_serializing_if = "Option::is_none")]
    pub remote_fingerprint: Option<String>,
    #[serde(default)]
    pub out_of_sync: bool,
    #[serde(default)]
    pub last_renewed: Option<DateTime<Utc>>,
    pub status: StatusLabel,
}

impl CertStatus {
    pub fn from_managed(managed: &ManagedCertificate, now: DateTime<Utc>) -> Self {
        let (not_after, days_left, status) = match &managed.current {
            Some(current) => {
                let days_left = (current.not_after - now).num_days();
                (Some(current.not_after), days_left, StatusLabel::from_days_left(days_left))
            }
            None => (None, 0, StatusLabel::Unknown),
        };

        let remote_fingerprint = managed
            .last_check
            .as_ref()
            .filter(|check| check.success)
            .and_then(|check| check.remote_fingerprint.clone())
            .filter(|fp| !fp.is_empty());

        Self {
            name: managed.target.name.clone(),
            common_name: managed.target.common_name.clone(),
            not_after,
            days_left,
            fingerprint: managed.fingerprint().unwrap_or_default().to_string(),
            out_of_sync: is_out_of_sync(managed.fingerprint(), remote_fingerprint.as_deref()),
            remote_fingerprint,
            last_renewed: managed.last_renewed,
            status,
        }
    }
}

/// Status of every certificate, sorted by name.
pub fn collect<'a>(
    certificates: impl IntoIterator<Item = &'a ManagedCertificate>,
    now: DateTime<Utc>,
) -> Vec<CertStatus> {
    let mut statuses: Vec<CertStatus> =
        certificates.into_iter().map(|m| CertStatus::from_managed(m, now)).collect();
    statuses.sort_by(|a, b| a.name.cmp(&b.name));
    statuses
}
