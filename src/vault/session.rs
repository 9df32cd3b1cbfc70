//! Authenticated Vault session shared by every issuance caller.
//!
//! The session's mutable state is the Vault client (which carries the token),
//! its status and the last refresh time. All of it sits behind one
//! `tokio::sync::RwLock`:
//!
//! - issue requests take the read lock, so they run concurrently with each other;
//! - token renewal and re-authentication take the write lock, so no request is
//!   ever sent with a token that is being replaced.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vaultrs::api::pki::requests::GenerateCertificateRequestBuilder;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};

use super::auth::AuthMethod;
use super::error::{AuthError, IssueError};
use super::types::{IssuedMaterial, SecretString};
use crate::certs::{CertificateIssuer, CertificateTarget};
use crate::config::{format_duration, VaultConfig};

/// Interval between token refresh attempts. Sits well inside a 1h lease.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(45 * 60);

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Health of the session credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Authenticated,
    /// Both renewal and re-authentication failed on the last refresh.
    Degraded,
}

struct SessionState {
    client: VaultClient,
    status: SessionStatus,
    last_refreshed: DateTime<Utc>,
}

/// One authenticated connection to Vault.
pub struct BackendSession {
    address: String,
    pki_mount: String,
    method: AuthMethod,
    http: reqwest::Client,
    state: RwLock<SessionState>,
}

impl BackendSession {
    /// Authenticate once and build the session. Failure here is fatal to startup.
    pub async fn connect(config: &VaultConfig) -> Result<Self, AuthError> {
        let method = AuthMethod::from_config(&config.auth)?;
        Self::with_method(&config.address, &config.pki_mount, method).await
    }

    /// Build a session around an explicit auth method.
    pub async fn with_method(
        address: &str,
        pki_mount: &str,
        method: AuthMethod,
    ) -> Result<Self, AuthError> {
        if address.trim().is_empty() {
            return Err(AuthError::config_invalid("Vault address cannot be empty"));
        }

        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| AuthError::config_invalid(format!("failed to build HTTP client: {}", e)))?;

        let address = address.trim_end_matches('/').to_string();
        let token = method.obtain_credential(&http, &address).await?;
        let client = build_client(&address, &token)?;

        tracing::info!(address = %address, auth_method = method.name(), "Authenticated with Vault");

        let pki_mount = pki_mount.trim_matches('/');
        Ok(Self {
            address,
            pki_mount: if pki_mount.is_empty() { "pki".to_string() } else { pki_mount.to_string() },
            method,
            http,
            state: RwLock::new(SessionState {
                client,
                status: SessionStatus::Authenticated,
                last_refreshed: Utc::now(),
            }),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.read().await.status
    }

    pub async fn last_refreshed(&self) -> DateTime<Utc> {
        self.state.read().await.last_refreshed
    }

    /// Renew the current token, falling back to a full login.
    ///
    /// Holds the write lock for the whole attempt. A failure of both paths marks
    /// the session degraded and is returned; the session stays usable for the
    /// next attempt.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        let mut state = self.state.write().await;

        match vaultrs::token::renew_self(&state.client, None).await {
            Ok(_) => {
                state.status = SessionStatus::Authenticated;
                state.last_refreshed = Utc::now();
                tracing::info!("Renewed Vault token");
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token renewal failed, re-authenticating");
            }
        }

        let relogin = match self.method.obtain_credential(&self.http, &self.address).await {
            Ok(token) => build_client(&self.address, &token),
            Err(e) => Err(e),
        };

        match relogin {
            Ok(client) => {
                state.client = client;
                state.status = SessionStatus::Authenticated;
                state.last_refreshed = Utc::now();
                tracing::info!(auth_method = self.method.name(), "Re-authenticated with Vault");
                Ok(())
            }
            Err(e) => {
                state.status = SessionStatus::Degraded;
                Err(e)
            }
        }
    }

    /// Spawn the periodic refresh loop. It exits when `shutdown` is cancelled;
    /// await the returned handle to confirm.
    pub fn spawn_refresh_loop(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("Token refresh loop stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.refresh().await {
                            tracing::error!(error = %e, "Failed to refresh Vault token");
                        }
                    }
                }
            }
        })
    }

    /// Request new material for `target` from the PKI engine.
    pub async fn issue_certificate(
        &self,
        target: &CertificateTarget,
    ) -> Result<IssuedMaterial, IssueError> {
        use vaultrs::pki::cert;

        let mut opts = GenerateCertificateRequestBuilder::default();
        opts.common_name(target.common_name.clone());
        opts.format("pem");
        if !target.ttl.is_zero() {
            opts.ttl(format_duration(target.ttl));
        }
        if !target.alt_names.is_empty() {
            opts.alt_names(target.alt_names.join(","));
        }
        let ip_sans = valid_ip_sans(&target.ip_sans);
        if !ip_sans.is_empty() {
            opts.ip_sans(ip_sans.join(","));
        }

        tracing::debug!(
            certificate = %target.name,
            role = %target.role,
            common_name = %target.common_name,
            pki_mount = %self.pki_mount,
            "Requesting certificate from Vault PKI"
        );

        let response = {
            let state = self.state.read().await;
            cert::generate(&state.client, &self.pki_mount, &target.role, Some(&mut opts)).await
        }
        .map_err(|e| {
            tracing::error!(error = %e, certificate = %target.name, "Vault PKI request failed");
            IssueError::from(e)
        })?;

        if response.certificate.trim().is_empty() {
            return Err(IssueError::invalid_response("certificate not found in response"));
        }
        if response.private_key.trim().is_empty() {
            return Err(IssueError::invalid_response("private_key not found in response"));
        }

        let ca_chain = match response.ca_chain.filter(|chain| !chain.is_empty()) {
            Some(chain) => Some(chain.join("\n")),
            None if !response.issuing_ca.is_empty() => Some(response.issuing_ca.clone()),
            None => None,
        };

        let expires_at = response.expiration.and_then(|ts| DateTime::from_timestamp(ts as i64, 0));
        let serial_number = Some(response.serial_number).filter(|s| !s.is_empty());

        tracing::info!(
            certificate = %target.name,
            serial_number = serial_number.as_deref().unwrap_or(""),
            "Issued certificate from Vault PKI"
        );

        Ok(IssuedMaterial {
            certificate: response.certificate,
            private_key: SecretString::new(response.private_key),
            ca_chain,
            serial_number,
            expires_at,
        })
    }
}

#[async_trait]
impl CertificateIssuer for BackendSession {
    async fn issue(&self, target: &CertificateTarget) -> Result<IssuedMaterial, IssueError> {
        self.issue_certificate(target).await
    }
}

fn build_client(address: &str, token: &SecretString) -> Result<VaultClient, AuthError> {
    let mut settings = VaultClientSettingsBuilder::default();
    settings.address(address);
    settings.token(token.expose_secret());

    let settings = settings
        .build()
        .map_err(|e| AuthError::config_invalid(format!("Invalid Vault configuration: {}", e)))?;

    VaultClient::new(settings)
        .map_err(|e| AuthError::config_invalid(format!("Failed to create Vault client: {}", e)))
}

/// Entries that parse as IP addresses; anything else is dropped with a warning.
fn valid_ip_sans(entries: &[String]) -> Vec<&str> {
    entries
        .iter()
        .map(|entry| entry.trim())
        .filter(|entry| {
            let valid = entry.parse::<IpAddr>().is_ok();
            if !valid {
                tracing::warn!(ip_san = %entry, "Ignoring invalid IP SAN");
            }
            valid
        })
        .collect()
}
