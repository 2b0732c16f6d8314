//! `client-balancer` monitor.
//!
//! Loads a client configuration, runs a load balancer against its server
//! list (refresh and health probing included) and prints the membership and
//! per-server stats as JSON at a fixed interval until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use clap::Parser;
use serde::Serialize;

use client_balancer::config::loader::load_config;
use client_balancer::load_balancer::{LoadBalancer, LoadBalancerStats, Server, ServerStatsSnapshot};
use client_balancer::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "client-balancer")]
#[command(about = "Watch a client-side load balancer's view of its servers", long_about = None)]
struct Cli {
    /// Client configuration file (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Seconds between reports
    #[arg(short, long, default_value_t = 10)]
    interval_secs: u64,

    /// Expose Prometheus metrics on the configured address
    #[arg(long)]
    metrics: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    client: &'a str,
    known: usize,
    reachable: usize,
    temporarily_down: Vec<String>,
    ping_dead: Vec<String>,
    servers: Vec<ServerStatsSnapshot>,
}

impl<'a> Report<'a> {
    fn new(client: &'a str, view: &LoadBalancerStats, now: Instant) -> Self {
        Self {
            client,
            known: view.server_count(),
            reachable: view.reachable_count(),
            temporarily_down: keys(view.temporarily_down_servers()),
            ping_dead: keys(view.ping_dead_servers()),
            servers: view.snapshots(now),
        }
    }
}

fn keys(servers: Vec<Arc<Server>>) -> Vec<String> {
    servers.iter().map(|s| s.host_port().to_string()).collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    logging::init_logging(&config.observability.log_level)?;
    tracing::info!(
        client = %config.client_name,
        rule = ?config.load_balancer_rule,
        ping_strategy = ?config.ping_strategy,
        "Configuration loaded"
    );

    if cli.metrics || config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let lb = LoadBalancer::new(config);
    lb.start().await;

    let mut ticker = tokio::time::interval(Duration::from_secs(cli.interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let view = lb.load_balancer_stats();
                let report = Report::new(lb.name(), &view, Instant::now());
                println!("{}", serde_json::to_string(&report)?);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }

    lb.shutdown();
    tracing::info!("Shutdown complete");
    Ok(())
}
