//! Active health checking.
//!
//! # Responsibilities
//! - Run one probe pass over a set of servers
//! - Log and record the outcome of every probe

use std::sync::Arc;

use crate::health::ping::Ping;
use crate::health::strategy::PingStrategy;
use crate::load_balancer::server::Server;
use crate::observability::metrics;

/// Pairs a `Ping` with the strategy that fans it out.
#[derive(Debug)]
pub struct HealthMonitor {
    ping: Arc<dyn Ping>,
    strategy: Box<dyn PingStrategy>,
}

impl HealthMonitor {
    pub fn new(ping: Arc<dyn Ping>, strategy: Box<dyn PingStrategy>) -> Self {
        Self { ping, strategy }
    }

    /// Probe every server once and return `(server, alive)` pairs.
    pub async fn check_all(&self, servers: &[Arc<Server>]) -> Vec<(Arc<Server>, bool)> {
        if servers.is_empty() {
            return Vec::new();
        }

        tracing::debug!(count = servers.len(), "Probing servers");
        let results = self.strategy.ping_servers(self.ping.as_ref(), servers).await;

        servers
            .iter()
            .cloned()
            .zip(results)
            .map(|(server, alive)| {
                if !alive {
                    tracing::debug!(server = %server, "Health check failed");
                }
                metrics::record_ping_result(server.host_port(), alive);
                (server, alive)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ping::NoOpPing;
    use crate::health::strategy::SerialPingStrategy;

    #[tokio::test]
    async fn test_check_all_pairs_results() {
        let monitor = HealthMonitor::new(Arc::new(NoOpPing), Box::new(SerialPingStrategy::new()));
        let servers = vec![
            Arc::new(Server::new("http", "a", 1)),
            Arc::new(Server::new("http", "b", 2)),
        ];
        let results = monitor.check_all(&servers).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, alive)| *alive));
        assert_eq!(results[1].0.host_port(), "b:2");
    }
}
