use std::net::IpAddr;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use metrics_collector::config::AgentSettings;
use metrics_collector::crypto;
use metrics_collector::store::{MemoryStore, MetricStore};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
struct Args {
    /// Path to an additional config file, loaded on top of config.yaml
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let args = Args::parse();

    let settings = AgentSettings::load().unwrap_or_else(|e| {
        eprintln!("failed to load configuration: {e:?}");
        std::process::exit(1);
    });

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| settings.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(?args.config, "loaded settings");

    let public_key = crypto::load_public_key(&settings.crypto_key).unwrap_or_else(|e| {
        error!(error = %e, "failed to parse public key, refusing to start");
        std::process::exit(1);
    });

    let local_ip = local_ip().unwrap_or_else(|| "127.0.0.1".parse().unwrap());

    let store: std::sync::Arc<dyn MetricStore> = std::sync::Arc::new(MemoryStore::new());
    let cancel = CancellationToken::new();

    let agent_task = tokio::spawn(metrics_collector::agent::run(
        store,
        Duration::from_secs(settings.poll_interval),
        Duration::from_secs(settings.report_interval),
        settings.address.clone(),
        settings.grpc_address.clone(),
        settings.key.clone(),
        Duration::from_secs(settings.server_timeout),
        public_key,
        local_ip,
        cancel.clone(),
    ));

    shutdown_signal().await;
    info!("shutdown signal received, cancelling agent tasks");
    cancel.cancel();

    if let Err(err) = agent_task.await {
        error!(error = %err, "agent task panicked");
    }

    Ok(())
}

fn local_ip() -> Option<IpAddr> {
    use std::net::UdpSocket;
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
