//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_function_invocation_total` (counter): invocations by function, status code
//! - `gateway_functions_seconds` (histogram): invocation latency by function
//! - `provider_log_streams_active` (gauge): log workers currently running
//! - `provider_scale_requests_total` (counter): scale requests by function, result
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so tests need no setup
//! - The exporter serves its own listener, separate from the API port

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => {
            describe();
            tracing::info!(address = %addr, "Metrics exporter listening");
        }
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter");
        }
    }
}

fn describe() {
    describe_counter!(
        "gateway_function_invocation_total",
        "Function invocations by function name and status code"
    );
    describe_histogram!(
        "gateway_functions_seconds",
        "Function invocation latency in seconds"
    );
    describe_gauge!("provider_log_streams_active", "Log streams currently open");
    describe_counter!(
        "provider_scale_requests_total",
        "Scale requests by function name and result"
    );
}

pub fn record_invocation(function: &str, status: u16, start: Instant) {
    counter!(
        "gateway_function_invocation_total",
        "function_name" => function.to_string(),
        "code" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_functions_seconds", "function_name" => function.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn log_stream_opened() {
    gauge!("provider_log_streams_active").increment(1.0);
}

pub fn log_stream_closed() {
    gauge!("provider_log_streams_active").decrement(1.0);
}

/// `result` is a short outcome tag: `ok`, `not_found` or `error`.
pub fn record_scale(function: &str, result: &'static str) {
    counter!(
        "provider_scale_requests_total",
        "function_name" => function.to_string(),
        "result" => result
    )
    .increment(1);
}
