use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use vault_cert_manager::{
    api,
    cli::Cli,
    config::{self, LoggingConfig},
    fleet::{self, AggregatorState, FleetAggregator},
    observability::{init_logging, install_recorder},
    App, APP_NAME, VERSION,
};

fn install_rustls_provider() {
    use rustls::crypto::{ring, CryptoProvider};

    if CryptoProvider::get_default().is_none() {
        ring::default_provider().install_default().expect("install ring crypto provider");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    install_rustls_provider();
    let cli = Cli::parse();

    if cli.aggregator {
        init_logging(&LoggingConfig::default())?;
        return run_aggregator(&cli).await;
    }

    let config_path = cli.config.as_deref().context("--config is required")?;
    let config = load_config(config_path)?;
    init_logging(&config.logging)?;

    info!(app_name = APP_NAME, version = VERSION, "Starting certificate manager");

    let handle = install_recorder()?;
    let mut app = App::connect(config, handle).await.context("failed to initialise")?;

    if cli.rotate {
        info!("Running one-time certificate rotation");
        app.force_rotate_all().await.context("certificate rotation failed")?;
        info!("Certificate rotation completed");
        return Ok(());
    }

    if let Err(e) = app.process_once().await {
        error!(error = %e, "Error processing certificates");
    }
    app.start_background_tasks().await?;

    let mut hangup = signal(SignalKind::hangup())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            _ = hangup.recv() => {
                info!("Received SIGHUP, forcing certificate rotation");
                if let Err(e) = app.force_rotate_all().await {
                    error!(error = %e, "Forced rotation failed");
                }
            }
            _ = interrupt.recv() => break,
            _ = terminate.recv() => break,
        }
    }

    info!("Shutdown signal received");
    app.stop().await;
    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<config::AppConfig> {
    config::load(path).with_context(|| format!("failed to load config from {}", path.display()))
}

async fn run_aggregator(cli: &Cli) -> anyhow::Result<()> {
    info!(
        consul = %cli.consul_addr,
        service = %cli.service_name,
        port = cli.port,
        timeout_secs = cli.timeout,
        "Starting aggregator mode"
    );

    let aggregator =
        FleetAggregator::new(&cli.consul_addr, &cli.service_name, cli.rotate_timeout())?;
    let router = fleet::build_router(AggregatorState { aggregator: Arc::new(aggregator) });

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
        token.cancel();
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    api::serve(addr, router, shutdown).await?;
    Ok(())
}
