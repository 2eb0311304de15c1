use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// ---------------------------------------------------------------------------
// Metrics catalog
// ---------------------------------------------------------------------------

/// Install the Prometheus recorder. Must run before any metrics are recorded.
pub fn install_prometheus_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus metrics recorder")
}

/// Register all metric descriptors at startup.
pub fn describe_all_metrics() {
    describe_counter!(
        "movievault_uploads_total",
        "Upload attempts by outcome (accepted/rejected)"
    );
    describe_histogram!("movievault_upload_size_bytes", "Accepted upload payload size");

    describe_counter!(
        "movievault_delivery_requests_total",
        "Delivery requests by status and mode"
    );
    describe_counter!(
        "movievault_delivery_bytes_sent_total",
        "Bytes committed for delivery"
    );
    describe_counter!(
        "movievault_range_not_satisfiable_total",
        "Range requests rejected with 416"
    );
    describe_counter!(
        "movievault_list_excluded_total",
        "Listing entries dropped after a failed metadata fetch"
    );

    describe_histogram!(
        "movievault_storage_get_duration_seconds",
        "Object store GET latency"
    );
    describe_histogram!(
        "movievault_storage_put_duration_seconds",
        "Object store PUT latency"
    );

    describe_counter!("movievault_panics_total", "Process panics caught by the hook");
    describe_gauge!("movievault_uptime_seconds", "Process uptime");
}

// ---------------------------------------------------------------------------
// Recording helpers
// ---------------------------------------------------------------------------

pub fn inc_upload(outcome: &'static str) {
    counter!("movievault_uploads_total", "outcome" => outcome).increment(1);
}

pub fn record_upload_size(bytes: f64) {
    histogram!("movievault_upload_size_bytes").record(bytes);
}

pub fn inc_delivery_request(status: &'static str, mode: &'static str) {
    counter!("movievault_delivery_requests_total", "status" => status, "mode" => mode).increment(1);
}

pub fn add_delivery_bytes_sent(bytes: u64) {
    counter!("movievault_delivery_bytes_sent_total").increment(bytes);
}

pub fn inc_range_not_satisfiable() {
    counter!("movievault_range_not_satisfiable_total").increment(1);
}

pub fn add_list_excluded(count: u64) {
    counter!("movievault_list_excluded_total").increment(count);
}

pub fn record_storage_get_duration(secs: f64) {
    histogram!("movievault_storage_get_duration_seconds").record(secs);
}

pub fn record_storage_put_duration(secs: f64) {
    histogram!("movievault_storage_put_duration_seconds").record(secs);
}

pub fn inc_panic_total() {
    counter!("movievault_panics_total").increment(1);
}

/// Periodically publish the uptime gauge until shutdown.
pub async fn run_uptime_task(start: Instant, cancel: tokio_util::sync::CancellationToken) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(10));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {
                gauge!("movievault_uptime_seconds").set(start.elapsed().as_secs_f64());
            }
        }
    }
}

/// Build a detached handle for tests; does not install a global recorder.
#[cfg(test)]
pub fn test_metrics_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}
