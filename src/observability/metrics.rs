//! Metrics collection and exposition.
//!
//! # Metrics
//! - `balancer_server_chosen_total` (counter): selections by client, server
//! - `balancer_no_server_total` (counter): failed selections by client
//! - `balancer_circuit_tripped_total` (counter): breaker trips by client, server
//! - `balancer_ping_result` (gauge): 1=alive, 0=dead, by server
//! - `balancer_known_servers` / `balancer_reachable_servers` (gauge): by client
//! - `balancer_response_time_ms` (histogram): call latency by server

use std::net::SocketAddr;
use std::time::Duration;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder with an HTTP scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus metrics endpoint started");
    Ok(())
}

pub fn record_server_chosen(client: &str, server: &str) {
    counter!(
        "balancer_server_chosen_total",
        "client" => client.to_string(),
        "server" => server.to_string()
    )
    .increment(1);
}

pub fn record_no_server(client: &str) {
    counter!("balancer_no_server_total", "client" => client.to_string()).increment(1);
}

pub fn record_circuit_tripped(client: &str, server: &str) {
    counter!(
        "balancer_circuit_tripped_total",
        "client" => client.to_string(),
        "server" => server.to_string()
    )
    .increment(1);
}

pub fn record_ping_result(server: &str, alive: bool) {
    gauge!("balancer_ping_result", "server" => server.to_string()).set(if alive { 1.0 } else { 0.0 });
}

pub fn record_server_counts(client: &str, known: usize, reachable: usize) {
    gauge!("balancer_known_servers", "client" => client.to_string()).set(known as f64);
    gauge!("balancer_reachable_servers", "client" => client.to_string()).set(reachable as f64);
}

pub fn record_response_time(server: &str, elapsed: Duration) {
    histogram!("balancer_response_time_ms", "server" => server.to_string())
        .record(elapsed.as_secs_f64() * 1000.0);
}
