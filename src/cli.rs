//! # Command Line Interface

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::fleet::{DEFAULT_AGGREGATOR_PORT, DEFAULT_CONSUL_ADDR, DEFAULT_SERVICE_NAME};

#[derive(Debug, Parser)]
#[command(name = "vault-cert-manager")]
#[command(about = "Issues and renews certificates from Vault PKI")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file or directory of *.yml/*.yaml files
    #[arg(short, long, required_unless_present = "aggregator")]
    pub config: Option<PathBuf>,

    /// Force-rotate every certificate once and exit
    #[arg(short, long)]
    pub rotate: bool,

    /// Run the fleet aggregator instead of the manager
    #[arg(short, long)]
    pub aggregator: bool,

    /// Consul HTTP address used for peer discovery
    #[arg(long, default_value = DEFAULT_CONSUL_ADDR)]
    pub consul_addr: String,

    /// Consul service name the managers register under
    #[arg(long, default_value = DEFAULT_SERVICE_NAME)]
    pub service_name: String,

    /// Aggregator listen port
    #[arg(short, long, default_value_t = DEFAULT_AGGREGATOR_PORT)]
    pub port: u16,

    /// Timeout in seconds for proxied rotate requests
    #[arg(long, default_value_t = 120)]
    pub timeout: u64,
}

impl Cli {
    pub fn rotate_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}
