//! # Fleet Aggregation
//!
//! Discovers every manager instance registered in Consul, merges their
//! `/api/status` responses and forwards rotate requests to a named node.

pub mod server;

use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::CertStatus;
use crate::errors::{Error, Result};

pub use server::{build_router, AggregatorState};

pub const DEFAULT_CONSUL_ADDR: &str = "http://localhost:8500";
pub const DEFAULT_SERVICE_NAME: &str = "vault-cert-manager";
pub const DEFAULT_AGGREGATOR_PORT: u16 = 9102;
pub const DEFAULT_ROTATE_TIMEOUT: Duration = Duration::from_secs(120);

/// Per-request timeout for discovery and status polls.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// One entry of `GET /v1/catalog/service/{name}`.
#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "Node")]
    node: String,
    #[serde(rename = "Address", default)]
    address: String,
    #[serde(rename = "ServiceAddress", default)]
    service_address: String,
    #[serde(rename = "ServicePort")]
    service_port: u16,
}

/// A discovered instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRef {
    pub node: String,
    pub address: String,
    pub port: u16,
}

impl From<CatalogEntry> for PeerRef {
    fn from(entry: CatalogEntry) -> Self {
        let address =
            if entry.service_address.is_empty() { entry.address } else { entry.service_address };
        Self { node: entry.node, address, port: entry.service_port }
    }
}

impl PeerRef {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.address, self.port, path)
    }
}

/// Certificates reported by one node. `error` is set when the poll failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerStatus {
    pub node: String,
    pub address: String,
    #[serde(default)]
    pub certs: Vec<CertStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Status code and body of a peer's response, relayed unchanged.
#[derive(Debug, Clone)]
pub struct ProxiedResponse {
    pub status: u16,
    pub body: Bytes,
}

pub struct FleetAggregator {
    consul_addr: String,
    service_name: String,
    poll_client: reqwest::Client,
    rotate_client: reqwest::Client,
}

impl FleetAggregator {
    pub fn new(
        consul_addr: impl Into<String>,
        service_name: impl Into<String>,
        rotate_timeout: Duration,
    ) -> Result<Self> {
        let poll_client = reqwest::Client::builder()
            .timeout(POLL_TIMEOUT)
            .build()
            .map_err(|e| Error::internal(format!("Failed to build HTTP client: {}", e)))?;
        let rotate_client = reqwest::Client::builder()
            .timeout(rotate_timeout)
            .build()
            .map_err(|e| Error::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            consul_addr: consul_addr.into().trim_end_matches('/').to_string(),
            service_name: service_name.into(),
            poll_client,
            rotate_client,
        })
    }

    pub fn consul_addr(&self) -> &str {
        &self.consul_addr
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// All instances registered under the service name.
    pub async fn discover_peers(&self) -> Result<Vec<PeerRef>> {
        let url = format!("{}/v1/catalog/service/{}", self.consul_addr, self.service_name);

        let response = self
            .poll_client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::discovery(format!("failed to query Consul: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::discovery(format!(
                "consul returned status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let entries: Vec<CatalogEntry> = response
            .json()
            .await
            .map_err(|e| Error::discovery(format!("failed to decode Consul response: {}", e)))?;

        Ok(entries.into_iter().map(PeerRef::from).collect())
    }

    /// Poll every discovered peer concurrently; sorted by node name.
    pub async fn poll_all(&self) -> Result<Vec<PeerStatus>> {
        let peers = self.discover_peers().await?;
        let mut statuses = join_all(peers.iter().map(|peer| self.poll_peer(peer))).await;
        statuses.sort_by(|a, b| a.node.cmp(&b.node));
        Ok(statuses)
    }

    /// Fetch one peer's status. Failures land in `error`.
    pub async fn poll_peer(&self, peer: &PeerRef) -> PeerStatus {
        let (certs, error) = match self.fetch_certs(peer).await {
            Ok(certs) => (certs, None),
            Err(error) => {
                warn!(node = %peer.node, error = %error, "Failed to poll peer");
                (Vec::new(), Some(error))
            }
        };
        PeerStatus { node: peer.node.clone(), address: peer.endpoint(), certs, error }
    }

    async fn fetch_certs(&self, peer: &PeerRef) -> std::result::Result<Vec<CertStatus>, String> {
        let response = self
            .poll_client
            .get(peer.url("/api/status"))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let code = response.status();
        if code != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("status {}: {}", code.as_u16(), body));
        }

        response.json::<Vec<CertStatus>>().await.map_err(|e| format!("decode error: {}", e))
    }

    /// Forward a rotate request to `node`. `cert = None` rotates everything.
    pub async fn proxy_rotate(&self, node: &str, cert: Option<&str>) -> Result<ProxiedResponse> {
        let peers = self.discover_peers().await?;
        let peer = peers
            .into_iter()
            .find(|peer| peer.node == node)
            .ok_or_else(|| Error::UnknownPeer(node.to_string()))?;

        let target = cert.filter(|c| !c.is_empty()).unwrap_or("all");
        let url = peer.url(&format!("/api/rotate/{}", target));
        info!(node = %node, cert = %target, url = %url, "Proxying rotate request");

        let response = self
            .rotate_client
            .post(&url)
            .send()
            .await
            .map_err(|e| Error::proxy(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| Error::proxy(e.to_string()))?;
        Ok(ProxiedResponse { status, body })
    }
}
