//! # Application
//!
//! Wires configuration, the Vault session, the lifecycle manager, the sync
//! checker and the HTTP surface together, and owns the background tasks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::{self, ApiState};
use crate::certs::{
    CertificateIssuer, CertificateService, CertificateTarget, CertificateView, LifecycleManager,
};
use crate::config::AppConfig;
use crate::errors::{Error, Result};
use crate::health::SyncChecker;
use crate::observability::CertificateMetrics;
use crate::vault::{BackendSession, DEFAULT_REFRESH_INTERVAL};

/// Interval of the certificate-processing tick.
pub const PROCESS_INTERVAL: Duration = Duration::from_secs(60);

pub struct App {
    config: AppConfig,
    certificates: CertificateService,
    session: Option<Arc<BackendSession>>,
    checker: SyncChecker,
    metrics: CertificateMetrics,
    handle: PrometheusHandle,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl App {
    /// Authenticate with Vault and register every configured certificate.
    /// Any failure here is fatal.
    pub async fn connect(config: AppConfig, handle: PrometheusHandle) -> Result<Self> {
        let session = Arc::new(BackendSession::connect(&config.vault).await?);
        let issuer: Arc<dyn CertificateIssuer> = session.clone();
        Self::from_parts(config, issuer, Some(session), handle)
    }

    /// Build around an explicit issuer. Without a session no token refresh
    /// loop is started.
    pub fn from_parts(
        config: AppConfig,
        issuer: Arc<dyn CertificateIssuer>,
        session: Option<Arc<BackendSession>>,
        handle: PrometheusHandle,
    ) -> Result<Self> {
        let metrics = CertificateMetrics::new();
        let mut manager = LifecycleManager::new(issuer, metrics.clone());

        for certificate in &config.certificates {
            manager.register(CertificateTarget::from(certificate))?;
        }

        info!(certificates = manager.len(), "Registered certificates");

        Ok(Self {
            config,
            certificates: CertificateService::new(manager),
            session,
            checker: SyncChecker::new()?,
            metrics,
            handle,
            shutdown: CancellationToken::new(),
            tasks: Vec::new(),
            local_addr: None,
        })
    }

    pub fn certificates(&self) -> &CertificateService {
        &self.certificates
    }

    /// Address the HTTP surface is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// One processing pass over every certificate.
    pub async fn process_once(&self) -> Result<()> {
        self.certificates.process_all().await
    }

    pub async fn force_rotate(&self, name: &str) -> Result<()> {
        self.certificates.force_rotate(name).await
    }

    pub async fn force_rotate_all(&self) -> Result<()> {
        self.certificates.force_rotate_all().await
    }

    /// Spawn the certificate tick, the metrics tick, the HTTP server and,
    /// with a Vault session, the token refresh loop.
    pub async fn start_background_tasks(&mut self) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.prometheus.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::internal(format!("Failed to bind HTTP server on {}: {}", addr, e)))?;
        self.local_addr = listener.local_addr().ok();
        info!(address = ?self.local_addr, "Starting HTTP server");

        let router = api::build_router(ApiState {
            certificates: self.certificates.clone(),
            metrics: self.handle.clone(),
        });
        let shutdown = self.shutdown.clone();
        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = api::serve_listener(listener, router, shutdown).await {
                error!(error = %e, "HTTP server error");
            }
        }));

        self.tasks.push(self.spawn_certificate_tick());
        self.tasks.push(self.spawn_metrics_tick());

        if let Some(session) = &self.session {
            self.tasks.push(
                Arc::clone(session).spawn_refresh_loop(DEFAULT_REFRESH_INTERVAL, self.shutdown.clone()),
            );
        }

        Ok(())
    }

    /// Cancel every background task and wait until all have exited.
    pub async fn stop(&mut self) {
        info!("Stopping certificate manager");
        self.shutdown.cancel();

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("All background tasks stopped");
    }

    fn spawn_certificate_tick(&self) -> JoinHandle<()> {
        let certificates = self.certificates.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + PROCESS_INTERVAL, PROCESS_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = certificates.process_all().await {
                            error!(error = %e, "Error processing certificates");
                        }
                    }
                }
            }
            debug!("Certificate tick stopped");
        })
    }

    fn spawn_metrics_tick(&self) -> JoinHandle<()> {
        let view = self.certificates.view().clone();
        let checker = self.checker.clone();
        let metrics = self.metrics.clone();
        let shutdown = self.shutdown.clone();
        let interval = self.config.prometheus.refresh_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        refresh_metrics(&view, &checker, &metrics).await;
                    }
                }
            }
            debug!("Metrics tick stopped");
        })
    }
}

/// Probe every endpoint, then record results and gauges. Works on the view
/// only, so it runs alongside an issuance.
pub async fn refresh_metrics(
    view: &CertificateView,
    checker: &SyncChecker,
    metrics: &CertificateMetrics,
) {
    for managed in view.snapshot() {
        if managed.target.health_check.is_some() {
            view.record_check(&managed.target.name, checker.check(&managed).await);
        }
    }

    for managed in view.snapshot() {
        metrics.update_certificate(&managed);
    }
    debug!(at = %Utc::now(), "Refreshed certificate metrics");
}
