//! # Configuration Management
//!
//! Loads the YAML configuration from a single file or from a directory of
//! `*.yml`/`*.yaml` fragments, applies defaults and validates the result.

pub mod duration;
pub mod settings;

use std::path::{Path, PathBuf};

pub use duration::{format_duration, parse_duration};
pub use settings::{
    AppConfig, AppRoleAuthConfig, AuthConfig, CertificateConfig, GcpAuthConfig, HealthCheckConfig,
    LoggingConfig, PrometheusConfig, TlsAuthConfig, TokenAuthConfig, VaultConfig,
    DEFAULT_APPROLE_MOUNT, DEFAULT_GCP_MOUNT, DEFAULT_HEALTH_TIMEOUT, DEFAULT_TLS_MOUNT,
};

use crate::errors::{Error, Result};

/// Load, merge, default and validate configuration from `path`.
///
/// A directory contributes every YAML file in name order. The first file that
/// carries a vault address or an auth block becomes the primary; the remaining
/// files only contribute their `certificates`.
pub fn load(path: impl AsRef<Path>) -> Result<AppConfig> {
    let path = path.as_ref();
    let metadata = std::fs::metadata(path)
        .map_err(|e| Error::config(format!("failed to stat path {}: {}", path.display(), e)))?;

    let mut configs = if metadata.is_dir() {
        load_directory(path)?
    } else {
        vec![load_file(path)?]
    };

    if configs.is_empty() {
        return Err(Error::config("no configuration files found"));
    }

    let mut merged = configs.remove(0);
    for extra in configs {
        merged.certificates.extend(extra.certificates);
    }

    merged.apply_defaults();
    merged.validate().map_err(|e| match e {
        Error::ConfigInvalid(message) => {
            Error::config(format!("invalid configuration: {}", message))
        }
        other => other,
    })?;

    Ok(merged)
}

fn load_file(path: &Path) -> Result<AppConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::config(format!("failed to read config file {}: {}", path.display(), e))
    })?;

    serde_yaml::from_str(&raw).map_err(|e| {
        Error::config(format!("failed to parse config file {}: {}", path.display(), e))
    })
}

fn load_directory(dir: &Path) -> Result<Vec<AppConfig>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        Error::config(format!("failed to read directory {}: {}", dir.display(), e))
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            matches!(path.extension().and_then(|ext| ext.to_str()), Some("yml") | Some("yaml"))
        })
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(Error::config(format!(
            "no .yml or .yaml files found in directory {}",
            dir.display()
        )));
    }

    let mut primary = None;
    let mut fragments = Vec::with_capacity(files.len());

    for file in &files {
        let config = load_file(file)?;
        let carries_vault =
            !config.vault.address.is_empty() || config.vault.auth.is_configured();

        if primary.is_none() && carries_vault {
            tracing::debug!(file = %file.display(), "Using primary configuration file");
            primary = Some(config);
        } else {
            fragments.push(config);
        }
    }

    if let Some(primary) = primary {
        fragments.insert(0, primary);
    }

    Ok(fragments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const PRIMARY: &str = r#"
vault:
  address: https://vault:8200
  auth:
    token:
      value: s.test
certificates:
  - name: api
    role: api-role
    common_name: api.example.com
    certificate: /tmp/api.crt
    key: /tmp/api.key
"#;

    const FRAGMENT: &str = r#"
certificates:
  - name: web
    role: web-role
    common_name: web.example.com
    certificate: /tmp/web.pem
    key: /tmp/web.pem
"#;

    #[test]
    fn test_load_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, PRIMARY).unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.vault.address, "https://vault:8200");
        assert_eq!(config.certificates.len(), 1);
    }

    #[test]
    fn test_load_directory_merges_certificates() {
        let dir = tempfile::tempdir().unwrap();
        // Sorts before the primary; must still contribute only certificates.
        fs::write(dir.path().join("00-web.yml"), FRAGMENT).unwrap();
        fs::write(dir.path().join("10-main.yaml"), PRIMARY).unwrap();
        fs::write(dir.path().join("README.md"), "ignored").unwrap();

        let config = load(dir.path()).unwrap();
        assert_eq!(config.vault.address, "https://vault:8200");
        let names: Vec<_> = config.certificates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["api", "web"]);
    }

    #[test]
    fn test_load_empty_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("no .yml or .yaml files found"));
    }

    #[test]
    fn test_load_invalid_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, FRAGMENT).unwrap();

        let err = load(&path).unwrap_err();
        assert!(err.to_string().contains("vault.address is required"));
    }
}
