//! Vault authentication strategies.
//!
//! The four supported login flows form a closed set, so they are variants of
//! [`AuthMethod`] dispatched by one `match` rather than trait objects.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use super::error::AuthError;
use super::gcp::{GcpLogin, GcpMode, DEFAULT_JWT_EXPIRY, METADATA_IDENTITY_URL};
use super::types::SecretString;
use crate::config::{AuthConfig, DEFAULT_APPROLE_MOUNT, DEFAULT_GCP_MOUNT, DEFAULT_TLS_MOUNT};

const LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the AppRole secret ID comes from.
#[derive(Debug, Clone)]
pub enum AppRoleSecret {
    Inline(SecretString),
    File(PathBuf),
}

/// One configured way of obtaining a Vault token.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    Token {
        token: SecretString,
    },
    AppRole {
        role_id: String,
        secret: AppRoleSecret,
        mount_path: String,
    },
    Gcp(GcpLogin),
    Tls {
        cert_file: PathBuf,
        key_file: PathBuf,
        mount_path: String,
        name: Option<String>,
    },
}

#[derive(Deserialize)]
struct LoginResponse {
    auth: Option<LoginAuth>,
}

#[derive(Deserialize)]
struct LoginAuth {
    #[serde(default)]
    client_token: String,
}

impl AuthMethod {
    /// Build the method from a validated auth block.
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        if config.method_count() != 1 {
            return Err(AuthError::config_invalid(format!(
                "exactly one authentication method must be specified, found {}",
                config.method_count()
            )));
        }

        if let Some(token) = &config.token {
            return Ok(AuthMethod::Token { token: SecretString::new(token.value.clone()) });
        }

        if let Some(approle) = &config.approle {
            let secret = match (&approle.secret_id_file, &approle.secret_id) {
                (Some(path), _) => AppRoleSecret::File(path.clone()),
                (None, Some(secret)) => AppRoleSecret::Inline(secret.clone()),
                (None, None) => {
                    return Err(AuthError::config_invalid(
                        "approle requires one of secret_id or secret_id_file",
                    ))
                }
            };
            return Ok(AuthMethod::AppRole {
                role_id: approle.role_id.clone(),
                secret,
                mount_path: mount_or(&approle.mount_path, DEFAULT_APPROLE_MOUNT),
            });
        }

        if let Some(gcp) = &config.gcp {
            return Ok(AuthMethod::Gcp(GcpLogin {
                mode: GcpMode::parse(&gcp.auth_type)?,
                role: gcp.role.clone(),
                mount_path: mount_or(&gcp.mount_path, DEFAULT_GCP_MOUNT),
                service_account: gcp.service_account.clone().filter(|s| !s.is_empty()),
                credentials_file: gcp.credentials_file.clone(),
                jwt_exp: gcp.jwt_exp.unwrap_or(DEFAULT_JWT_EXPIRY),
                metadata_url: METADATA_IDENTITY_URL.to_string(),
            }));
        }

        match &config.tls {
            Some(tls) => Ok(AuthMethod::Tls {
                cert_file: PathBuf::from(&tls.cert_file),
                key_file: PathBuf::from(&tls.key_file),
                mount_path: mount_or(&tls.mount_path, DEFAULT_TLS_MOUNT),
                name: tls.name.clone().filter(|n| !n.is_empty()),
            }),
            None => Err(AuthError::config_invalid("no authentication method configured")),
        }
    }

    /// Short label used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            AuthMethod::Token { .. } => "token",
            AuthMethod::AppRole { .. } => "approle",
            AuthMethod::Gcp(_) => "gcp",
            AuthMethod::Tls { .. } => "tls",
        }
    }

    /// Run the login flow once and return the resulting client token.
    ///
    /// `address` is the Vault base address. Failures are returned as-is; the
    /// caller decides whether and when to retry.
    pub async fn obtain_credential(
        &self,
        http: &reqwest::Client,
        address: &str,
    ) -> Result<SecretString, AuthError> {
        match self {
            AuthMethod::Token { token } => {
                if token.is_empty() {
                    return Err(AuthError::config_invalid("token.value is empty"));
                }
                Ok(token.clone())
            }
            AuthMethod::AppRole { role_id, secret, mount_path } => {
                let secret_id = resolve_secret_id(secret)?;
                tracing::debug!(mount_path = %mount_path, "Attempting AppRole authentication");
                let body = json!({ "role_id": role_id, "secret_id": secret_id.expose_secret() });
                login(http, address, mount_path, &body).await
            }
            AuthMethod::Gcp(gcp) => {
                let jwt = gcp.fetch_jwt(http).await?;
                tracing::debug!(
                    auth_type = gcp.mode.as_str(),
                    role = %gcp.role,
                    mount_path = %gcp.mount_path,
                    "Attempting GCP authentication"
                );
                let body = json!({ "role": gcp.role, "jwt": jwt.expose_secret() });
                login(http, address, &gcp.mount_path, &body).await
            }
            AuthMethod::Tls { cert_file, key_file, mount_path, name } => {
                let client = mtls_client(cert_file, key_file)?;
                tracing::debug!(
                    cert_file = %cert_file.display(),
                    mount_path = %mount_path,
                    "Attempting TLS certificate authentication"
                );
                let body = match name {
                    Some(name) => json!({ "name": name }),
                    None => json!({}),
                };
                login(&client, address, mount_path, &body).await
            }
        }
    }
}

fn mount_or(mount_path: &str, default: &str) -> String {
    let trimmed = mount_path.trim_matches('/');
    if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    }
}

fn resolve_secret_id(secret: &AppRoleSecret) -> Result<SecretString, AuthError> {
    match secret {
        AppRoleSecret::Inline(value) => Ok(value.clone()),
        AppRoleSecret::File(path) => {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                AuthError::config_invalid(format!(
                    "failed to read secret_id_file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Err(AuthError::config_invalid(format!(
                    "secret_id_file {} is empty",
                    path.display()
                )));
            }
            Ok(SecretString::new(trimmed))
        }
    }
}

/// A client presenting the configured certificate during the TLS handshake.
fn mtls_client(cert_file: &Path, key_file: &Path) -> Result<reqwest::Client, AuthError> {
    let mut pem = std::fs::read(cert_file).map_err(|e| {
        AuthError::config_invalid(format!("failed to read {}: {}", cert_file.display(), e))
    })?;
    let key = std::fs::read(key_file).map_err(|e| {
        AuthError::config_invalid(format!("failed to read {}: {}", key_file.display(), e))
    })?;
    pem.push(b'\n');
    pem.extend_from_slice(&key);

    let identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
        AuthError::config_invalid(format!("failed to load TLS certificate pair: {}", e))
    })?;

    reqwest::Client::builder()
        .use_rustls_tls()
        .identity(identity)
        .timeout(LOGIN_TIMEOUT)
        .build()
        .map_err(|e| AuthError::config_invalid(format!("failed to build TLS client: {}", e)))
}

/// `POST {address}/v1/auth/{mount}/login` and extract `auth.client_token`.
async fn login(
    http: &reqwest::Client,
    address: &str,
    mount_path: &str,
    body: &serde_json::Value,
) -> Result<SecretString, AuthError> {
    let url = format!("{}/v1/auth/{}/login", address.trim_end_matches('/'), mount_path);

    let response = http
        .post(&url)
        .json(body)
        .timeout(LOGIN_TIMEOUT)
        .send()
        .await
        .map_err(|e| AuthError::from_transport("login request failed", e))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(AuthError::backend_rejected(format!(
            "auth/{}/login returned status {}: {}",
            mount_path,
            status.as_u16(),
            text.trim()
        )));
    }

    let parsed: LoginResponse = response.json().await.map_err(|e| {
        AuthError::backend_rejected(format!("failed to decode login response: {}", e))
    })?;

    match parsed.auth.filter(|auth| !auth.client_token.is_empty()) {
        Some(auth) => Ok(SecretString::new(auth.client_token)),
        None => Err(AuthError::backend_rejected("no authentication information returned")),
    }
}
