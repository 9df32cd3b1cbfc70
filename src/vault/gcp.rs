//! GCP identity tokens for the Vault `gcp` auth method.
//!
//! `gce` asks the instance metadata server for a signed identity token. `iam`
//! signs a JWT with a service-account key and trades it at the key's token URI
//! for the token handed to Vault.

use std::path::{Path, PathBuf};
use std::time::Duration;

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use super::error::AuthError;
use super::types::SecretString;

pub const METADATA_IDENTITY_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/identity";
pub const DEFAULT_JWT_EXPIRY: Duration = Duration::from_secs(15 * 60);

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);
const VAULT_AUDIENCE: &str = "vault";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// How the GCP identity token is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcpMode {
    Gce,
    Iam,
}

impl GcpMode {
    pub fn parse(value: &str) -> Result<Self, AuthError> {
        match value {
            "gce" => Ok(GcpMode::Gce),
            "iam" => Ok(GcpMode::Iam),
            other => Err(AuthError::config_invalid(format!(
                "unsupported GCP auth type: {}",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GcpMode::Gce => "gce",
            GcpMode::Iam => "iam",
        }
    }
}

/// Parameters of a GCP login.
#[derive(Debug, Clone)]
pub struct GcpLogin {
    pub mode: GcpMode,
    pub role: String,
    pub mount_path: String,
    pub service_account: Option<String>,
    pub credentials_file: Option<PathBuf>,
    pub jwt_exp: Duration,
    pub metadata_url: String,
}

impl GcpLogin {
    /// Produce the JWT sent to Vault as `{role, jwt}`.
    pub async fn fetch_jwt(&self, http: &reqwest::Client) -> Result<SecretString, AuthError> {
        match self.mode {
            GcpMode::Gce => self.gce_identity_token(http).await,
            GcpMode::Iam => self.iam_token(http).await,
        }
    }

    async fn gce_identity_token(&self, http: &reqwest::Client) -> Result<SecretString, AuthError> {
        let response = http
            .get(&self.metadata_url)
            .query(&[("audience", VAULT_AUDIENCE), ("format", "full")])
            .header("Metadata-Flavor", "Google")
            .timeout(METADATA_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                AuthError::network_failure(format!("failed to retrieve GCE identity token: {}", e))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AuthError::network_failure(format!("failed to read identity token: {}", e))
        })?;

        if !status.is_success() {
            return Err(AuthError::backend_rejected(format!(
                "metadata service returned status {}: {}",
                status.as_u16(),
                body
            )));
        }

        Ok(SecretString::new(body.trim()))
    }

    async fn iam_token(&self, http: &reqwest::Client) -> Result<SecretString, AuthError> {
        let key = ServiceAccountKey::load(self.credentials_file.as_deref())?;
        let email = self.service_account.clone().unwrap_or_else(|| key.client_email.clone());
        let assertion = key.sign_assertion(&email, self.jwt_exp)?;

        tracing::debug!(service_account = %email, token_uri = %key.token_uri, "Exchanging signed JWT");

        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", JWT_BEARER_GRANT)
            .append_pair("assertion", assertion.expose_secret())
            .finish();

        let response = http
            .post(&key.token_uri)
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| AuthError::from_transport("token exchange failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AuthError::backend_rejected(format!(
                "token endpoint returned status {}: {}",
                status.as_u16(),
                text
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            AuthError::backend_rejected(format!("failed to decode token response: {}", e))
        })?;

        match token.access_token.filter(|t| !t.is_empty()) {
            Some(access_token) => Ok(SecretString::new(access_token)),
            None => Err(AuthError::backend_rejected("token response carried no access_token")),
        }
    }
}

/// The fields of a service-account JSON key this module needs.
#[derive(Deserialize)]
pub struct ServiceAccountKey {
    #[serde(default)]
    pub private_key_id: String,
    #[serde(default)]
    private_key: String,
    #[serde(default)]
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

impl ServiceAccountKey {
    /// Read the key from `path`, or from the application-default location.
    pub fn load(path: Option<&Path>) -> Result<Self, AuthError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_credentials_path().ok_or_else(|| {
                AuthError::config_invalid("failed to find default GCP credentials")
            })?,
        };

        let raw = std::fs::read_to_string(&path).map_err(|e| {
            AuthError::config_invalid(format!(
                "failed to read credentials file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, AuthError> {
        let key: ServiceAccountKey = serde_json::from_str(raw).map_err(|e| {
            AuthError::config_invalid(format!("failed to parse service account credentials: {}", e))
        })?;

        if key.private_key.is_empty() || key.client_email.is_empty() {
            return Err(AuthError::config_invalid(
                "credentials are not a service account key (private_key/client_email missing)",
            ));
        }
        Ok(key)
    }

    /// RS256 assertion with audience `vault`, valid for `ttl`.
    pub fn sign_assertion(&self, email: &str, ttl: Duration) -> Result<SecretString, AuthError> {
        let encoding_key = EncodingKey::from_rsa_pem(self.private_key.as_bytes()).map_err(|e| {
            AuthError::config_invalid(format!("invalid service account private key: {}", e))
        })?;

        let mut header = Header::new(Algorithm::RS256);
        if !self.private_key_id.is_empty() {
            header.kid = Some(self.private_key_id.clone());
        }

        let now = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: email,
            aud: VAULT_AUDIENCE,
            iat: now,
            exp: now + ttl.as_secs() as i64,
        };

        jsonwebtoken::encode(&header, &claims, &encoding_key)
            .map(SecretString::new)
            .map_err(|e| AuthError::config_invalid(format!("failed to generate IAM JWT: {}", e)))
    }
}

fn default_credentials_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("GOOGLE_APPLICATION_CREDENTIALS") {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let home = std::env::var_os("HOME")?;
    let candidate =
        PathBuf::from(home).join(".config/gcloud/application_default_credentials.json");
    candidate.exists().then_some(candidate)
}
