//! # Configuration Settings
//!
//! Defines the YAML configuration structure for the certificate manager.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{Error, Result};
use crate::vault::SecretString;

pub const DEFAULT_PKI_MOUNT: &str = "pki";
pub const DEFAULT_APPROLE_MOUNT: &str = "approle";
pub const DEFAULT_GCP_MOUNT: &str = "gcp";
pub const DEFAULT_TLS_MOUNT: &str = "cert";
pub const DEFAULT_METRICS_PORT: u16 = 9090;
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_CERT_TTL: Duration = Duration::from_secs(24 * 3_600);
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

const LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 2] = ["text", "json"];

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    /// Vault connection and authentication
    #[serde(default)]
    #[validate(nested)]
    pub vault: VaultConfig,

    /// Metrics and HTTP control surface
    #[serde(default)]
    #[validate(nested)]
    pub prometheus: PrometheusConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Managed certificates, in registration order
    #[serde(default)]
    #[validate(nested)]
    pub certificates: Vec<CertificateConfig>,
}

impl AppConfig {
    /// Fill in defaults for fields left empty or zero.
    pub fn apply_defaults(&mut self) {
        if self.vault.pki_mount.is_empty() {
            self.vault.pki_mount = DEFAULT_PKI_MOUNT.to_string();
        }
        self.vault.auth.apply_defaults();

        if self.prometheus.port == 0 {
            self.prometheus.port = DEFAULT_METRICS_PORT;
        }
        if self.prometheus.refresh_interval.is_zero() {
            self.prometheus.refresh_interval = DEFAULT_REFRESH_INTERVAL;
        }

        if self.logging.level.is_empty() {
            self.logging.level = "info".to_string();
        }
        if self.logging.format.is_empty() {
            self.logging.format = "text".to_string();
        }

        for cert in &mut self.certificates {
            if cert.ttl.is_zero() {
                cert.ttl = DEFAULT_CERT_TTL;
            }
            if let Some(check) = cert.health_check.as_mut() {
                if check.timeout.is_zero() {
                    check.timeout = DEFAULT_HEALTH_TIMEOUT;
                }
            }
        }
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        if self.vault.address.trim().is_empty() {
            return Err(Error::config("vault.address is required"));
        }

        self.vault
            .auth
            .validate_methods()
            .map_err(|e| Error::config(format!("vault.auth: {}", e)))?;

        Validate::validate(self).map_err(|e| Error::config(e.to_string()))?;

        self.validate_custom()
    }

    fn validate_custom(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(Error::config(format!(
                "logging.level must be one of 'debug', 'info', 'warn', 'error', got '{}'",
                self.logging.level
            )));
        }
        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(Error::config(format!(
                "logging.format must be 'json' or 'text', got '{}'",
                self.logging.format
            )));
        }

        let mut names = HashSet::new();
        for (index, cert) in self.certificates.iter().enumerate() {
            if cert.name.is_empty() {
                return Err(Error::config(format!("certificates[{}].name is required", index)));
            }
            if !names.insert(cert.name.as_str()) {
                return Err(Error::config(format!("duplicate certificate name: {}", cert.name)));
            }

            let required = [
                ("role", cert.role.is_empty()),
                ("common_name", cert.common_name.is_empty()),
                ("certificate", cert.certificate.as_os_str().is_empty()),
                ("key", cert.key.as_os_str().is_empty()),
            ];
            if let Some((field, _)) = required.iter().find(|(_, missing)| *missing) {
                return Err(Error::config(format!(
                    "certificates[{}].{} is required for {}",
                    index, field, cert.name
                )));
            }
        }

        Ok(())
    }
}

/// Vault connection configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct VaultConfig {
    /// Vault server address, e.g. `https://vault:8200`
    #[serde(default)]
    pub address: String,

    /// PKI secrets engine mount
    #[serde(default = "default_pki_mount")]
    pub pki_mount: String,

    #[serde(default)]
    #[validate(nested)]
    pub auth: AuthConfig,
}

fn default_pki_mount() -> String {
    DEFAULT_PKI_MOUNT.to_string()
}

/// Authentication block. Exactly one method must be present.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AuthConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub token: Option<TokenAuthConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub approle: Option<AppRoleAuthConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub gcp: Option<GcpAuthConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub tls: Option<TlsAuthConfig>,
}

impl AuthConfig {
    /// Number of populated authentication methods.
    pub fn method_count(&self) -> usize {
        [self.token.is_some(), self.approle.is_some(), self.gcp.is_some(), self.tls.is_some()]
            .iter()
            .filter(|present| **present)
            .count()
    }

    /// True when any method is configured. Used to pick the primary file of a
    /// config directory.
    pub fn is_configured(&self) -> bool {
        self.method_count() > 0
    }

    fn apply_defaults(&mut self) {
        if let Some(approle) = self.approle.as_mut() {
            if approle.mount_path.is_empty() {
                approle.mount_path = DEFAULT_APPROLE_MOUNT.to_string();
            }
        }
        if let Some(gcp) = self.gcp.as_mut() {
            if gcp.mount_path.is_empty() {
                gcp.mount_path = DEFAULT_GCP_MOUNT.to_string();
            }
        }
        if let Some(tls) = self.tls.as_mut() {
            if tls.mount_path.is_empty() {
                tls.mount_path = DEFAULT_TLS_MOUNT.to_string();
            }
        }
    }

    fn validate_methods(&self) -> std::result::Result<(), String> {
        match self.method_count() {
            0 => {
                return Err("exactly one authentication method must be specified \
                            (token, approle, gcp, or tls)"
                    .to_string())
            }
            1 => {}
            n => return Err(format!("only one authentication method can be specified, found {}", n)),
        }

        if let Some(approle) = &self.approle {
            match (&approle.secret_id, &approle.secret_id_file) {
                (Some(_), Some(_)) => {
                    return Err("approle.secret_id and approle.secret_id_file are mutually exclusive"
                        .to_string())
                }
                (None, None) => {
                    return Err("approle requires one of secret_id or secret_id_file".to_string())
                }
                _ => {}
            }
        }

        if let Some(gcp) = &self.gcp {
            if gcp.auth_type.is_empty() {
                return Err("gcp.type is required (must be 'iam' or 'gce')".to_string());
            }
            if gcp.auth_type != "iam" && gcp.auth_type != "gce" {
                return Err(format!("gcp.type must be 'iam' or 'gce', got '{}'", gcp.auth_type));
            }
        }

        Ok(())
    }
}

/// Static token authentication
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TokenAuthConfig {
    #[validate(length(min = 1, message = "token.value is required"))]
    pub value: String,
}

/// AppRole authentication
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppRoleAuthConfig {
    #[validate(length(min = 1, message = "approle.role_id is required"))]
    pub role_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_id: Option<SecretString>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_id_file: Option<PathBuf>,

    #[serde(default)]
    pub mount_path: String,
}

/// GCP authentication, `gce` (metadata identity token) or `iam` (signed JWT)
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GcpAuthConfig {
    #[serde(rename = "type", default)]
    pub auth_type: String,

    #[validate(length(min = 1, message = "gcp.role is required"))]
    pub role: String,

    #[serde(default)]
    pub mount_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_file: Option<PathBuf>,

    #[serde(default, with = "super::duration::option", skip_serializing_if = "Option::is_none")]
    pub jwt_exp: Option<Duration>,
}

/// TLS client certificate authentication
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TlsAuthConfig {
    #[validate(length(min = 1, message = "tls.cert_file is required"))]
    pub cert_file: String,

    #[validate(length(min = 1, message = "tls.key_file is required"))]
    pub key_file: String,

    #[serde(default)]
    pub mount_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Metrics endpoint and HTTP control surface
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PrometheusConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,

    /// How often gauges and health checks are recomputed
    #[serde(default = "default_refresh_interval", with = "super::duration")]
    #[validate(custom(function = "validate_non_zero"))]
    pub refresh_interval: Duration,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self { port: DEFAULT_METRICS_PORT, refresh_interval: DEFAULT_REFRESH_INTERVAL }
    }
}

fn default_metrics_port() -> u16 {
    DEFAULT_METRICS_PORT
}

fn default_refresh_interval() -> Duration {
    DEFAULT_REFRESH_INTERVAL
}

fn validate_non_zero(value: &Duration) -> std::result::Result<(), validator::ValidationError> {
    if value.is_zero() {
        return Err(validator::ValidationError::new("zero_duration"));
    }
    Ok(())
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// One of debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `text` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// One managed certificate
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CertificateConfig {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub role: String,

    #[serde(default)]
    pub common_name: String,

    /// Certificate output path
    #[serde(default)]
    pub certificate: PathBuf,

    /// Private key output path; equal to `certificate` for a combined file
    #[serde(default)]
    pub key: PathBuf,

    #[serde(default = "default_cert_ttl", with = "super::duration")]
    pub ttl: Duration,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alt_names: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_sans: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Shell command run after new material is written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_change: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub health_check: Option<HealthCheckConfig>,
}

fn default_cert_ttl() -> Duration {
    DEFAULT_CERT_TTL
}

/// TLS endpoint presenting the certificate
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HealthCheckConfig {
    #[serde(default)]
    #[validate(length(
        min = 1,
        message = "health_check.tcp is required when health_check is specified"
    ))]
    pub tcp: String,

    #[serde(default = "default_health_timeout", with = "super::duration")]
    pub timeout: Duration,
}

fn default_health_timeout() -> Duration {
    DEFAULT_HEALTH_TIMEOUT
}
