//! Read-side copy of the managed certificates.
//!
//! The lifecycle manager publishes every target here after registration and
//! after each successful issuance. Status requests and the metrics tick read
//! from the view, so they never wait on an issuance in progress.

use std::sync::{Arc, RwLock};

use super::ManagedCertificate;
use crate::health::CheckResult;

#[derive(Debug, Clone, Default)]
pub struct CertificateView {
    entries: Arc<RwLock<Vec<ManagedCertificate>>>,
}

impl CertificateView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry with the same name. The last sync check
    /// recorded on the view is kept.
    pub fn publish(&self, managed: &ManagedCertificate) {
        if let Ok(mut entries) = self.entries.write() {
            let mut published = managed.clone();
            match entries.iter_mut().find(|e| e.target.name == managed.target.name) {
                Some(existing) => {
                    published.last_check = existing.last_check.take();
                    *existing = published;
                }
                None => entries.push(published),
            }
        }
    }

    pub fn record_check(&self, name: &str, result: CheckResult) {
        if let Ok(mut entries) = self.entries.write() {
            if let Some(entry) = entries.iter_mut().find(|e| e.target.name == name) {
                entry.last_check = Some(result);
            }
        }
    }

    /// Entries in registration order.
    pub fn snapshot(&self) -> Vec<ManagedCertificate> {
        self.entries.read().map(|entries| entries.clone()).unwrap_or_default()
    }

    pub fn get(&self, name: &str) -> Option<ManagedCertificate> {
        let entries = self.entries.read().ok()?;
        entries.iter().find(|e| e.target.name == name).cloned()
    }
}
