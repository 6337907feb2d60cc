use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use metrics_collector::config::ServerSettings;
use metrics_collector::crypto;
use metrics_collector::http::{create_router, AppState};
use metrics_collector::rpc::{MetricsServer, MetricsService};
use metrics_collector::store::{DatabaseStore, FileStore, MemoryStore, MetricStore, Preserver};
use metrics_collector::telemetry;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
struct Args {
    /// Path to an additional config file, loaded on top of config.yaml
    #[arg(long)]
    config: Option<String>,

    /// Truncate both domain tables before starting (database backend only)
    #[arg(long)]
    reset: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let args = Args::parse();

    let settings = ServerSettings::load().unwrap_or_else(|e| {
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

    let cancel = CancellationToken::new();
    let prometheus = telemetry::install_recorder();

    let mut preserver_task: Option<tokio::task::JoinHandle<()>> = None;

    let store: Arc<dyn MetricStore> = if !settings.database_dsn.is_empty() {
        let store = DatabaseStore::connect(&settings.database_dsn).await?;
        if args.reset {
            info!("truncating domain tables per --reset");
            store.reset().await?;
        }
        Arc::new(store)
    } else if !settings.store_file.is_empty() {
        let path = std::path::PathBuf::from(&settings.store_file);
        let file_store = Arc::new(FileStore::new(path, settings.restore).await?);

        let preserver = Preserver::new(file_store.clone(), Duration::from_secs(settings.store_interval));
        preserver_task = Some(tokio::spawn(preserver.run(cancel.clone())));

        file_store
    } else {
        Arc::new(MemoryStore::new())
    };

    let private_key = crypto::load_private_key(&settings.crypto_key).unwrap_or_else(|e| {
        error!(error = %e, "failed to parse private key, refusing to start");
        std::process::exit(1);
    });

    let app_state = Arc::new(AppState {
        store: store.clone(),
        sign_key: settings.key.clone(),
        private_key: private_key.map(Arc::new),
        trusted_subnet: settings.trusted_subnet.clone(),
        cancel: cancel.clone(),
    });

    let http_addr: SocketAddr = settings.address.parse()?;
    let router = create_router(app_state, prometheus);
    let listener = TcpListener::bind(http_addr).await?;
    info!(%http_addr, "http listener bound");

    let http_cancel = cancel.clone();
    let http_task = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { http_cancel.cancelled().await })
            .await
    });

    let grpc_addr: SocketAddr = settings.grpc_address.parse()?;
    let metrics_service = MetricsServer::new(MetricsService::new(
        store.clone(),
        settings.key.clone(),
        cancel.clone(),
    ));
    let grpc_cancel = cancel.clone();
    info!(%grpc_addr, "grpc listener bound");
    let grpc_task = tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(metrics_service)
            .serve_with_shutdown(grpc_addr, async move { grpc_cancel.cancelled().await })
            .await
    });

    tokio::spawn(shutdown_signal(cancel.clone()));

    let http_abort = http_task.abort_handle();
    tokio::spawn(async move {
        cancel.cancelled().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        http_abort.abort();
    });

    let preserver_join = async {
        if let Some(handle) = preserver_task {
            if let Err(err) = handle.await {
                error!(error = %err, "preserver task panicked");
            }
        }
    };

    let (http_result, grpc_result, ()) = tokio::join!(http_task, grpc_task, preserver_join);
    if let Err(err) = http_result {
        error!(error = %err, "http server task panicked");
    }
    if let Err(err) = grpc_result {
        error!(error = %err, "grpc server task panicked");
    }

    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
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

    info!("shutdown signal received");
    cancel.cancel();
}
