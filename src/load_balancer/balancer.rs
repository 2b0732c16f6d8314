//! Server selection and health tracking for one client.
//!
//! # Responsibilities
//! - Hold the known-server set and its per-server stats
//! - Choose a server per call from the reachable set via the configured `Rule`
//! - Toggle temp-down membership when circuits trip or recover
//! - Drive the server-list refresh and health probe loops
//!
//! # Design Decisions
//! - Membership is published as an immutable `LoadBalancerStats` through
//!   `ArcSwap`; writers use read-copy-update, readers never block
//! - A removed server's stats leave with the same snapshot that drops it
//! - Background loops hold the inner state only, so dropping the balancer
//!   (or calling `shutdown`) stops them deterministically

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use arc_swap::ArcSwap;

use crate::config::ClientConfig;
use crate::discovery::{self, ServerListSource};
use crate::error::{BalancerError, DiscoveryError};
use crate::health::active::HealthMonitor;
use crate::health::ping::{ping_from_config, Ping};
use crate::health::strategy::strategy_for;
use crate::lifecycle::scheduler::Scheduler;
use crate::load_balancer::server::Server;
use crate::load_balancer::stats::{LoadBalancerStats, ServerStats};
use crate::load_balancer::{rule_for, Rule};
use crate::observability::metrics;
use crate::resilience::circuit_breaker::CircuitBreakerPolicy;

/// Client-side load balancer.
#[derive(Debug)]
pub struct LoadBalancer {
    inner: Arc<Inner>,
    refresh: Scheduler,
    probe: Scheduler,
}

/// State shared with the background loops.
#[derive(Debug)]
struct Inner {
    name: String,
    config: ClientConfig,
    view: ArcSwap<LoadBalancerStats>,
    rule: Box<dyn Rule>,
    health: HealthMonitor,
    source: Arc<dyn ServerListSource>,
    policy: CircuitBreakerPolicy,
    failure_window: Duration,
}

/// Builds a `LoadBalancer`, falling back to configuration for every part
/// that is not supplied explicitly.
pub struct LoadBalancerBuilder {
    config: ClientConfig,
    source: Option<Arc<dyn ServerListSource>>,
    ping: Option<Arc<dyn Ping>>,
    rule: Option<Box<dyn Rule>>,
}

impl LoadBalancerBuilder {
    pub fn server_list(mut self, source: Arc<dyn ServerListSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn ping(mut self, ping: Arc<dyn Ping>) -> Self {
        self.ping = Some(ping);
        self
    }

    pub fn rule(mut self, rule: Box<dyn Rule>) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn build(self) -> LoadBalancer {
        let config = self.config;
        let name = config.load_balancer_key().to_string();
        let source = self
            .source
            .unwrap_or_else(|| discovery::source_from_config(&config));
        let ping = self.ping.unwrap_or_else(|| ping_from_config(&config));
        let rule = self.rule.unwrap_or_else(|| rule_for(config.load_balancer_rule));
        let health = HealthMonitor::new(ping, strategy_for(config.ping_strategy));

        let inner = Inner {
            policy: CircuitBreakerPolicy::from_config(&config),
            failure_window: config.failure_count_sliding_window_interval(),
            view: ArcSwap::from_pointee(LoadBalancerStats::default()),
            name: name.clone(),
            rule,
            health,
            source,
            config,
        };

        LoadBalancer {
            refresh: Scheduler::new(format!("{}-refresh", name), inner.config.scheduler_overlap),
            probe: Scheduler::new(format!("{}-ping", name), inner.config.scheduler_overlap),
            inner: Arc::new(inner),
        }
    }
}

impl LoadBalancer {
    /// A balancer whose rule, ping and server list all come from `config`.
    pub fn new(config: ClientConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: ClientConfig) -> LoadBalancerBuilder {
        LoadBalancerBuilder {
            config,
            source: None,
            ping: None,
            rule: None,
        }
    }

    /// Name used in logs and metric labels (the load balancer key).
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Pull the initial server list, then start the refresh and probe loops.
    /// Calling it again while the loops run only refreshes the list.
    pub async fn start(&self) {
        if let Err(e) = self.inner.refresh_server_list().await {
            tracing::warn!(client = %self.inner.name, error = %e, "Initial server list unavailable");
        }

        let inner = self.inner.clone();
        self.refresh.schedule(
            move || {
                let inner = inner.clone();
                async move {
                    if let Err(e) = inner.refresh_server_list().await {
                        tracing::warn!(client = %inner.name, error = %e, "Server list refresh failed, keeping current servers");
                    }
                }
            },
            self.inner.config.list_of_servers_polling_interval(),
            Duration::ZERO,
        );

        let inner = self.inner.clone();
        self.probe.schedule(
            move || {
                let inner = inner.clone();
                async move { inner.ping_servers().await }
            },
            self.inner.config.ping_interval(),
            Duration::ZERO,
        );

        tracing::info!(
            client = %self.inner.name,
            servers = self.inner.view.load().server_count(),
            "Load balancer started"
        );
    }

    /// Stop both background loops. In-flight probes finish on their own.
    pub fn shutdown(&self) {
        self.refresh.cancel();
        self.probe.cancel();
        tracing::info!(client = %self.inner.name, "Load balancer stopped");
    }

    pub fn is_running(&self) -> bool {
        self.refresh.is_running() || self.probe.is_running()
    }

    /// Choose a server from the reachable set.
    pub fn choose_server(&self, routing_key: Option<&str>) -> Result<Arc<Server>, BalancerError> {
        self.inner.choose_server(routing_key)
    }

    /// Exclude a server from selection. Idempotent; unknown servers are ignored.
    ///
    /// Temp-down is held by the server's circuit breaker: the next probe or
    /// refresh pass restores any entry whose breaker is not tripped. A server
    /// marked down while its breaker is closed is therefore only out until
    /// that pass.
    pub fn mark_server_temp_down(&self, server: &Server) {
        self.inner.mark_server_temp_down(server);
    }

    /// Clear the server's failure streak and return it to the eligible set.
    pub fn mark_server_ready(&self, server: &Server) {
        self.inner.mark_server_ready(server);
    }

    /// Current membership snapshot.
    pub fn load_balancer_stats(&self) -> Arc<LoadBalancerStats> {
        self.inner.view.load_full()
    }

    pub fn single_server_stats(&self, server: &Server) -> Option<Arc<ServerStats>> {
        self.inner.view.load().single_server_stats(server)
    }

    /// Replace the known-server set: new servers get fresh stats, existing
    /// ones keep theirs, vanished ones are dropped with their stats.
    pub fn set_servers(&self, servers: Vec<Server>) {
        self.inner.set_servers(servers);
    }

    /// Pull the list from the discovery source once. On failure the current
    /// membership is kept.
    pub async fn refresh_server_list(&self) -> Result<usize, DiscoveryError> {
        self.inner.refresh_server_list().await
    }

    /// Run one probe pass over every known server.
    pub async fn ping_servers(&self) {
        self.inner.ping_servers().await;
    }

    /// Return temp-down servers whose breaker has expired at `now` to the
    /// eligible set. Returns how many were restored.
    pub fn restore_expired_servers(&self, now: Instant) -> usize {
        self.inner.restore_expired_servers(now)
    }
}

impl Inner {
    /// Read-copy-update of the membership snapshot, then refresh the gauges.
    fn update<F>(&self, f: F)
    where
        F: FnMut(&Arc<LoadBalancerStats>) -> Arc<LoadBalancerStats>,
    {
        self.view.rcu(f);
        let view = self.view.load();
        metrics::record_server_counts(&self.name, view.server_count(), view.reachable_count());
    }

    fn choose_server(&self, routing_key: Option<&str>) -> Result<Arc<Server>, BalancerError> {
        let view = self.view.load();
        match self.rule.choose(view.reachable_stats(), routing_key) {
            Some(stats) => {
                let server = stats.server().clone();
                tracing::debug!(client = %self.name, server = %server, "Server chosen");
                metrics::record_server_chosen(&self.name, server.host_port());
                Ok(server)
            }
            None => {
                tracing::warn!(
                    client = %self.name,
                    known = view.server_count(),
                    temp_down = view.temp_down_keys().len(),
                    ping_dead = view.ping_dead_keys().len(),
                    "No server available"
                );
                metrics::record_no_server(&self.name);
                Err(BalancerError::NoServerAvailable {
                    client: self.name.clone(),
                    known: view.server_count(),
                })
            }
        }
    }

    fn mark_server_temp_down(&self, server: &Server) {
        let key = server.host_port();
        {
            let view = self.view.load();
            if view.stats_by_key(key).is_none() || view.is_temporarily_down(server) {
                return;
            }
        }

        let mut changed = false;
        self.update(|current| {
            changed = current.stats_by_key(key).is_some() && !current.is_temporarily_down(server);
            if !changed {
                return current.clone();
            }
            let mut temp_down = current.temp_down_keys().clone();
            temp_down.insert(key.to_string());
            Arc::new(LoadBalancerStats::build(
                current.stats().to_vec(),
                temp_down,
                current.ping_dead_keys().clone(),
            ))
        });

        if changed {
            tracing::info!(client = %self.name, server = %key, "Server marked temporarily down");
        }
    }

    fn mark_server_ready(&self, server: &Server) {
        let key = server.host_port();
        if let Some(stats) = self.view.load().stats_by_key(key) {
            stats.clear_successive_connection_failure_count();
        }

        if !self.view.load().is_temporarily_down(server) {
            return;
        }

        let mut changed = false;
        self.update(|current| {
            changed = current.is_temporarily_down(server);
            if !changed {
                return current.clone();
            }
            let mut temp_down = current.temp_down_keys().clone();
            temp_down.remove(key);
            Arc::new(LoadBalancerStats::build(
                current.stats().to_vec(),
                temp_down,
                current.ping_dead_keys().clone(),
            ))
        });

        if changed {
            tracing::info!(client = %self.name, server = %key, "Server marked ready");
        }
    }

    fn set_servers(&self, servers: Vec<Server>) {
        let mut wanted: Vec<Server> = Vec::with_capacity(servers.len());
        let mut seen = HashSet::new();
        for server in servers {
            if seen.insert(server.host_port().to_string()) {
                wanted.push(server);
            }
        }

        let mut added = Vec::new();
        let mut removed = Vec::new();
        self.update(|current| {
            added.clear();
            removed.clear();

            let next: Vec<Arc<ServerStats>> = wanted
                .iter()
                .map(|server| match current.stats_by_key(server.host_port()) {
                    Some(existing) => existing.clone(),
                    None => {
                        added.push(server.host_port().to_string());
                        Arc::new(ServerStats::new(
                            Arc::new(server.clone()),
                            self.policy,
                            self.failure_window,
                        ))
                    }
                })
                .collect();

            removed.extend(
                current
                    .stats()
                    .iter()
                    .map(|s| s.server().host_port())
                    .filter(|key| !seen.contains(*key))
                    .map(str::to_string),
            );

            Arc::new(LoadBalancerStats::build(
                next,
                current.temp_down_keys().clone(),
                current.ping_dead_keys().clone(),
            ))
        });

        for key in &added {
            tracing::info!(client = %self.name, server = %key, "Server added");
        }
        for key in &removed {
            tracing::info!(client = %self.name, server = %key, "Server removed");
        }
    }

    async fn refresh_server_list(&self) -> Result<usize, DiscoveryError> {
        let servers = self.source.server_list().await?;
        let count = servers.len();
        tracing::debug!(client = %self.name, count, "Server list refreshed");
        self.set_servers(servers);
        self.restore_expired_servers(Instant::now());
        Ok(count)
    }

    async fn ping_servers(&self) {
        let servers = self.view.load().all_servers();
        let results = self.health.check_all(&servers).await;

        let dead: HashSet<String> = results
            .iter()
            .filter(|(_, alive)| !alive)
            .map(|(server, _)| server.host_port().to_string())
            .collect();
        let probed: HashSet<&str> = results.iter().map(|(server, _)| server.host_port()).collect();

        let previous = self.view.load().ping_dead_keys().clone();
        self.update(|current| {
            // Servers added during the pass keep their previous state
            let mut ping_dead: HashSet<String> = current
                .ping_dead_keys()
                .iter()
                .filter(|key| !probed.contains(key.as_str()))
                .cloned()
                .collect();
            ping_dead.extend(dead.iter().cloned());
            Arc::new(LoadBalancerStats::build(
                current.stats().to_vec(),
                current.temp_down_keys().clone(),
                ping_dead,
            ))
        });

        for key in dead.difference(&previous) {
            tracing::info!(client = %self.name, server = %key, "Server failed health check");
        }
        for key in previous.difference(&dead).filter(|k| probed.contains(k.as_str())) {
            tracing::info!(client = %self.name, server = %key, "Server passed health check");
        }

        self.restore_expired_servers(Instant::now());
    }

    fn restore_expired_servers(&self, now: Instant) -> usize {
        {
            let view = self.view.load();
            if !view.temp_down_keys().iter().any(|key| breaker_expired(&view, key, now)) {
                return 0;
            }
        }

        let mut restored: Vec<String> = Vec::new();
        self.update(|current| {
            restored.clear();
            let mut temp_down = HashSet::new();
            for key in current.temp_down_keys() {
                if breaker_expired(current, key, now) {
                    restored.push(key.clone());
                } else {
                    temp_down.insert(key.clone());
                }
            }
            Arc::new(LoadBalancerStats::build(
                current.stats().to_vec(),
                temp_down,
                current.ping_dead_keys().clone(),
            ))
        });

        for key in &restored {
            tracing::info!(client = %self.name, server = %key, "Circuit breaker expired, server eligible again");
        }
        restored.len()
    }
}

/// A temp-down entry whose breaker no longer holds the server out.
fn breaker_expired(view: &LoadBalancerStats, key: &str, now: Instant) -> bool {
    view.stats_by_key(key)
        .map_or(true, |stats| !stats.is_circuit_breaker_tripped(now))
}
