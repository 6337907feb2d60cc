mod poller;
mod reporter;
mod transport;

pub use reporter::ReporterConfig;
pub use transport::{Transport, TransportError};

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use rsa::RsaPublicKey;
use tokio_util::sync::CancellationToken;

use crate::store::MetricStore;

/// Spawns the runtime sampler, process sampler and reporter as independent
/// tasks sharing one cancellation scope, and waits for all three to finish.
/// Mirrors the original agent's `main` goroutine fan-out.
pub async fn run(
    store: Arc<dyn MetricStore>,
    poll_interval: Duration,
    report_interval: Duration,
    server_address: String,
    grpc_address: String,
    sign_key: String,
    server_timeout: Duration,
    public_key: Option<RsaPublicKey>,
    local_ip: IpAddr,
    cancel: CancellationToken,
) {
    let transport = Arc::new(Transport::new(server_timeout, public_key, local_ip));
    let reporter_config = ReporterConfig {
        http_base_url: format!("http://{server_address}"),
        grpc_address,
        report_interval,
        sign_key,
    };

    let runtime_sampler = tokio::spawn(poller::run_runtime_sampler(
        store.clone(),
        poll_interval,
        cancel.clone(),
    ));
    let process_sampler = tokio::spawn(poller::run_process_sampler(
        store.clone(),
        poll_interval,
        cancel.clone(),
    ));
    let reporter_task = tokio::spawn(reporter::run(store, transport, reporter_config, cancel));

    let _ = tokio::join!(runtime_sampler, process_sampler, reporter_task);
}
