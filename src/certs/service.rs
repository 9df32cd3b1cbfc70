//! Shared handle over the lifecycle manager.
//!
//! Issuances are serialized by one mutex. The lock is released before queued
//! `on_change` hooks run, and readers go through the [`CertificateView`], so a
//! slow Vault request or hook never holds up status or metrics.

use std::sync::Arc;

use tokio::sync::Mutex;

use super::manager::{run_hooks, LifecycleManager};
use super::view::CertificateView;
use crate::errors::Result;

#[derive(Clone)]
pub struct CertificateService {
    manager: Arc<Mutex<LifecycleManager>>,
    view: CertificateView,
}

impl CertificateService {
    pub fn new(manager: LifecycleManager) -> Self {
        let view = manager.view().clone();
        Self { manager: Arc::new(Mutex::new(manager)), view }
    }

    pub fn view(&self) -> &CertificateView {
        &self.view
    }

    pub async fn process_all(&self) -> Result<()> {
        let (result, hooks) = {
            let mut manager = self.manager.lock().await;
            let result = manager.process_all().await;
            (result, manager.take_pending_hooks())
        };
        run_hooks(hooks).await;
        result
    }

    pub async fn force_rotate(&self, name: &str) -> Result<()> {
        let (result, hooks) = {
            let mut manager = self.manager.lock().await;
            let result = manager.force_rotate(name).await;
            (result, manager.take_pending_hooks())
        };
        run_hooks(hooks).await;
        result
    }

    /// Hooks of the targets that did rotate still run when others failed.
    pub async fn force_rotate_all(&self) -> Result<()> {
        let (result, hooks) = {
            let mut manager = self.manager.lock().await;
            let result = manager.force_rotate_all().await;
            (result, manager.take_pending_hooks())
        };
        run_hooks(hooks).await;
        result
    }
}
