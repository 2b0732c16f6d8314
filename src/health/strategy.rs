//! Probe fan-out strategies.
//!
//! - `SerialPingStrategy`: one probe at a time; the starting server rotates
//!   every pass so a slow server cannot always delay the same tail
//! - `ParallelPingStrategy`: every server probed concurrently; faster
//!   passes, burstier load on the targets

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use async_trait::async_trait;
use futures_util::future::join_all;

use crate::config::PingStrategyKind;
use crate::health::ping::Ping;
use crate::load_balancer::server::Server;

/// Applies a `Ping` to a set of servers.
#[async_trait]
pub trait PingStrategy: Send + Sync + fmt::Debug {
    /// Liveness of each server, in the order of `servers`.
    async fn ping_servers(&self, ping: &dyn Ping, servers: &[Arc<Server>]) -> Vec<bool>;
}

/// Probes servers one after another.
#[derive(Debug, Default)]
pub struct SerialPingStrategy {
    start: AtomicUsize,
}

impl SerialPingStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PingStrategy for SerialPingStrategy {
    async fn ping_servers(&self, ping: &dyn Ping, servers: &[Arc<Server>]) -> Vec<bool> {
        let len = servers.len();
        let mut results = vec![false; len];
        if len == 0 {
            return results;
        }
        let start = self.start.fetch_add(1, Ordering::Relaxed);
        for i in 0..len {
            let index = (start + i) % len;
            results[index] = ping.is_alive(&servers[index]).await;
        }
        results
    }
}

/// Probes all servers concurrently.
#[derive(Debug, Default)]
pub struct ParallelPingStrategy;

impl ParallelPingStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PingStrategy for ParallelPingStrategy {
    async fn ping_servers(&self, ping: &dyn Ping, servers: &[Arc<Server>]) -> Vec<bool> {
        join_all(servers.iter().map(|s| ping.is_alive(s))).await
    }
}

/// Build the strategy named in configuration.
pub fn strategy_for(kind: PingStrategyKind) -> Box<dyn PingStrategy> {
    match kind {
        PingStrategyKind::Serial => Box::new(SerialPingStrategy::new()),
        PingStrategyKind::Parallel => Box::new(ParallelPingStrategy::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Alive iff the port is even; tracks peak concurrency.
    #[derive(Debug, Default)]
    struct EvenPortPing {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        order: Mutex<Vec<u16>>,
    }

    #[async_trait]
    impl Ping for EvenPortPing {
        async fn is_alive(&self, server: &Server) -> bool {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.order.lock().unwrap().push(server.port());
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            server.port() % 2 == 0
        }
    }

    fn servers() -> Vec<Arc<Server>> {
        (8080..8084).map(|p| Arc::new(Server::new("http", "127.0.0.1", p))).collect()
    }

    #[tokio::test]
    async fn test_serial_one_at_a_time() {
        let ping = EvenPortPing::default();
        let strategy = SerialPingStrategy::new();
        let results = strategy.ping_servers(&ping, &servers()).await;
        assert_eq!(results, vec![true, false, true, false]);
        assert_eq!(ping.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_serial_rotates_start() {
        let ping = EvenPortPing::default();
        let strategy = SerialPingStrategy::new();
        strategy.ping_servers(&ping, &servers()).await;
        strategy.ping_servers(&ping, &servers()).await;
        let order = ping.order.lock().unwrap().clone();
        assert_eq!(order[0], 8080);
        assert_eq!(order[4], 8081);
    }

    #[tokio::test]
    async fn test_parallel_fans_out() {
        let ping = EvenPortPing::default();
        let strategy = ParallelPingStrategy::new();
        let results = strategy.ping_servers(&ping, &servers()).await;
        assert_eq!(results, vec![true, false, true, false]);
        assert!(ping.peak.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_empty_server_list() {
        let ping = EvenPortPing::default();
        assert!(SerialPingStrategy::new().ping_servers(&ping, &[]).await.is_empty());
        assert!(ParallelPingStrategy::new().ping_servers(&ping, &[]).await.is_empty());
    }
}
