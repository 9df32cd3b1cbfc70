//! Renewal scheduling and issuance for the registered targets.
//!
//! The manager is not internally synchronized. Callers serialize access (see
//! [`CertificateService`](super::CertificateService)). `on_change` hooks are
//! queued rather than run, so callers can run them after releasing the lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tracing::Instrument;

use super::store::CertificateStore;
use super::view::CertificateView;
use super::{CertificateIssuer, CertificateTarget, ManagedCertificate};
use crate::errors::{Error, Result};
use crate::observability::CertificateMetrics;

/// Upper bound (exclusive) of the per-target renewal jitter.
pub const MAX_JITTER: Duration = Duration::from_secs(3_600);

const HOOK_TIMEOUT: Duration = Duration::from_secs(300);

/// Insert-once registry keyed by target name, iterated in insertion order.
///
/// There is no removal: targets live for the whole process.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<ManagedCertificate>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn insert(&mut self, managed: ManagedCertificate) -> Result<()> {
        let name = managed.target.name.clone();
        if self.index.contains_key(&name) {
            return Err(Error::DuplicateTarget(name));
        }
        self.index.insert(name, self.entries.len());
        self.entries.push(managed);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ManagedCertificate> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManagedCertificate> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `on_change` command owed for a target whose material was just replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingHook {
    pub certificate: String,
    pub command: String,
}

impl PendingHook {
    /// Run the command. Failure is logged; the new material stays in place.
    pub async fn run(self) {
        match run_hook(&self.command).await {
            Ok(()) => tracing::debug!(certificate = %self.certificate, "Ran on_change script"),
            Err(e) => tracing::warn!(
                certificate = %self.certificate,
                error = %e,
                "Failed to run on_change script"
            ),
        }
    }
}

/// Run hooks one after another, in the order their certificates were issued.
pub async fn run_hooks(hooks: Vec<PendingHook>) {
    for hook in hooks {
        hook.run().await;
    }
}

/// Decides when targets are renewed and drives issue, write and reload.
pub struct LifecycleManager {
    issuer: Arc<dyn CertificateIssuer>,
    store: CertificateStore,
    metrics: CertificateMetrics,
    registry: Registry,
    view: CertificateView,
    pending_hooks: Vec<PendingHook>,
}

impl LifecycleManager {
    pub fn new(issuer: Arc<dyn CertificateIssuer>, metrics: CertificateMetrics) -> Self {
        Self {
            issuer,
            store: CertificateStore::new(),
            metrics,
            registry: Registry::default(),
            view: CertificateView::new(),
            pending_hooks: Vec::new(),
        }
    }

    /// Read-side copy, updated after registration and each issuance.
    pub fn view(&self) -> &CertificateView {
        &self.view
    }

    /// Hooks queued by issuances since the last call.
    pub fn take_pending_hooks(&mut self) -> Vec<PendingHook> {
        std::mem::take(&mut self.pending_hooks)
    }

    /// Register a target with a random jitter in `[0, 1h)`.
    pub fn register(&mut self, target: CertificateTarget) -> Result<()> {
        let jitter_ms = rand::thread_rng().gen_range(0..MAX_JITTER.as_millis() as u64);
        self.register_with_jitter(target, Duration::from_millis(jitter_ms))
    }

    /// Register a target with an explicit jitter.
    pub fn register_with_jitter(&mut self, target: CertificateTarget, jitter: Duration) -> Result<()> {
        if self.registry.get(&target.name).is_some() {
            return Err(Error::DuplicateTarget(target.name));
        }

        let mut managed = ManagedCertificate::new(target, jitter);
        match self.store.load(&managed.target) {
            Ok(parsed) => {
                managed.current = Some(parsed);
                managed.next_renewal = managed.renewal_deadline();
                tracing::info!(
                    certificate = %managed.target.name,
                    not_after = ?managed.current.as_ref().map(|c| c.not_after),
                    "Loaded existing certificate"
                );
            }
            Err(e) => {
                tracing::debug!(
                    certificate = %managed.target.name,
                    error = %e,
                    "No usable certificate on disk yet"
                );
            }
        }

        tracing::debug!(
            certificate = %managed.target.name,
            jitter_secs = managed.jitter.as_secs(),
            "Registered certificate"
        );
        self.view.publish(&managed);
        self.registry.insert(managed)
    }

    pub fn get(&self, name: &str) -> Option<&ManagedCertificate> {
        self.registry.get(name)
    }

    pub fn certificates(&self) -> impl Iterator<Item = &ManagedCertificate> {
        self.registry.iter()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn store(&self) -> &CertificateStore {
        &self.store
    }

    /// One pass over every target, in registration order.
    ///
    /// Per target: renew if due, then issue if the material is missing on disk.
    /// Failures are logged and the pass moves on to the next target.
    pub async fn process_all(&mut self) -> Result<()> {
        let now = Utc::now();

        for position in 0..self.registry.len() {
            let managed = &self.registry.entries[position];
            let name = managed.target.name.clone();
            let span = crate::target_span!(name);

            if managed.is_due(now) {
                tracing::info!(parent: &span, certificate = %name, "Certificate needs renewal");
                if let Err(e) = self.issue_at(position).instrument(span.clone()).await {
                    tracing::error!(parent: &span, certificate = %name, error = %e, "Failed to renew certificate");
                    continue;
                }
            }

            let managed = &self.registry.entries[position];
            if self.store.is_missing(&managed.target) {
                tracing::info!(
                    parent: &span,
                    certificate = %name,
                    "Certificate does not exist on disk, issuing new certificate"
                );
                if let Err(e) = self.issue_at(position).instrument(span.clone()).await {
                    tracing::error!(parent: &span, certificate = %name, error = %e, "Failed to issue certificate");
                }
            }
        }

        Ok(())
    }

    /// Issue immediately for one target, regardless of due state.
    pub async fn force_rotate(&mut self, name: &str) -> Result<()> {
        let position =
            self.registry.position(name).ok_or_else(|| Error::UnknownTarget(name.to_string()))?;

        tracing::info!(certificate = %name, "Force rotating certificate");
        self.issue_at(position).instrument(crate::target_span!(name)).await
    }

    /// Issue immediately for every target. All targets are attempted; the
    /// error lists the ones that failed.
    pub async fn force_rotate_all(&mut self) -> Result<()> {
        let mut failed = Vec::new();

        for position in 0..self.registry.len() {
            let name = self.registry.entries[position].target.name.clone();
            tracing::info!(certificate = %name, "Force rotating certificate");

            if let Err(e) = self.issue_at(position).instrument(crate::target_span!(name)).await {
                tracing::error!(certificate = %name, error = %e, "Failed to rotate certificate");
                failed.push(name);
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::RotationFailed { failed })
        }
    }

    /// Request, write, reload, publish, then queue the hook.
    async fn issue_at(&mut self, position: usize) -> Result<()> {
        let Self { issuer, store, metrics, registry, view, pending_hooks } = self;
        let managed = &mut registry.entries[position];
        let name = managed.target.name.clone();

        let result = issue_and_store(issuer.as_ref(), store, managed).await;
        metrics.record_renewal(&name, result.is_ok());
        result?;

        metrics.update_certificate(managed);
        view.publish(managed);

        if let Some(command) = managed.target.on_change.clone() {
            pending_hooks.push(PendingHook { certificate: name.clone(), command });
        }

        tracing::info!(certificate = %name, "Successfully issued/renewed certificate");
        Ok(())
    }
}

async fn issue_and_store(
    issuer: &dyn CertificateIssuer,
    store: &CertificateStore,
    managed: &mut ManagedCertificate,
) -> Result<()> {
    let material = issuer.issue(&managed.target).await?;
    store.write(&managed.target, &material)?;
    drop(material);

    let parsed = store.load(&managed.target)?;
    managed.current = Some(parsed);
    managed.last_renewed = Some(Utc::now());
    managed.next_renewal = managed.renewal_deadline();
    Ok(())
}

/// Run `command` through `sh -c`. Non-zero exit or spawn failure is an error.
pub async fn run_hook(command: &str) -> Result<()> {
    let child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(HOOK_TIMEOUT, child)
        .await
        .map_err(|_| Error::hook(format!("timed out after {}s", HOOK_TIMEOUT.as_secs())))?
        .map_err(|e| Error::hook(format!("failed to spawn: {}", e)))?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        return Err(Error::hook(format!("{}: {}", output.status, combined.trim())));
    }

    tracing::debug!(output = %combined.trim(), "On-change script executed successfully");
    Ok(())
}
