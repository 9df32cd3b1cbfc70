//! Secret-bearing value types shared by the auth and issuance paths.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A string wrapper that redacts its contents in Debug, Display, and serialization.
///
/// Used for Vault tokens, AppRole secret IDs and private keys. Memory is zeroed
/// on drop; the value is only reachable through [`SecretString::expose_secret`].
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Exposes the underlying secret value. Never log the result.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for SecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretString)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SecretString {}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Material returned by one PKI issue request.
///
/// Transient: written to disk by the certificate store and then dropped.
#[derive(Clone)]
pub struct IssuedMaterial {
    /// PEM-encoded leaf certificate
    pub certificate: String,

    /// PEM-encoded private key (redacted in logs)
    pub private_key: SecretString,

    /// PEM-encoded CA chain, newline-joined; `None` when Vault returned neither
    /// `ca_chain` nor `issuing_ca`
    pub ca_chain: Option<String>,

    pub serial_number: Option<String>,

    pub expires_at: Option<DateTime<Utc>>,
}

impl IssuedMaterial {
    /// Leaf certificate followed by the chain, if any.
    pub fn full_chain(&self) -> String {
        match &self.ca_chain {
            Some(chain) => format!("{}\n{}", self.certificate, chain),
            None => self.certificate.clone(),
        }
    }
}

impl fmt::Debug for IssuedMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedMaterial")
            .field("certificate", &format!("[{} bytes PEM]", self.certificate.len()))
            .field("private_key", &self.private_key)
            .field(
                "ca_chain",
                &self.ca_chain.as_ref().map(|c| format!("[{} bytes PEM]", c.len())),
            )
            .field("serial_number", &self.serial_number)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
