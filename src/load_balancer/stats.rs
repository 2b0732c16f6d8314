//! Per-server statistics and the circuit-breaker record.
//!
//! # Responsibilities
//! - Track in-flight and total requests (for LeastConnections and telemetry)
//! - Record response times and failures within a sliding window
//! - Track the successive-failure streak that drives the circuit breaker
//! - Expose an immutable membership view (`LoadBalancerStats`)
//!
//! # Design Decisions
//! - Every counter is its own atomic; no record-level lock on the hot path
//! - Streak length and last-failure time share one atomic word so the
//!   breaker always reads a consistent pair
//! - `is_circuit_breaker_tripped` is a pure read

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use serde::Serialize;

use crate::load_balancer::server::Server;
use crate::resilience::circuit_breaker::CircuitBreakerPolicy;
use crate::resilience::failure_window::FailureWindow;

const STREAK_SHIFT: u32 = 48;
const TIMESTAMP_MASK: u64 = (1 << STREAK_SHIFT) - 1;
const STREAK_MAX: u64 = u16::MAX as u64;

/// Health and load record of one server.
#[derive(Debug)]
pub struct ServerStats {
    server: Arc<Server>,
    policy: CircuitBreakerPolicy,
    origin: Instant,

    active_requests: AtomicU64,
    total_requests: AtomicU64,

    response_count: AtomicU64,
    response_sum_micros: AtomicU64,
    response_min_micros: AtomicU64,
    response_max_micros: AtomicU64,

    failures: FailureWindow,

    /// Successive tripping failures (upper 16 bits) and the time of the last
    /// one in milliseconds since `origin` (lower 48 bits).
    breaker: AtomicU64,
}

impl ServerStats {
    /// Create a new record for a server.
    pub fn new(server: Arc<Server>, policy: CircuitBreakerPolicy, failure_window: Duration) -> Self {
        let origin = Instant::now();
        Self {
            server,
            policy,
            origin,
            active_requests: AtomicU64::new(0),
            total_requests: AtomicU64::new(0),
            response_count: AtomicU64::new(0),
            response_sum_micros: AtomicU64::new(0),
            response_min_micros: AtomicU64::new(u64::MAX),
            response_max_micros: AtomicU64::new(0),
            failures: FailureWindow::new(failure_window, origin),
            breaker: AtomicU64::new(0),
        }
    }

    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }

    pub fn policy(&self) -> &CircuitBreakerPolicy {
        &self.policy
    }

    // --- Load ---

    pub fn increment_active_requests_count(&self) {
        self.active_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement the in-flight count, never below zero.
    pub fn decrement_active_requests_count(&self) {
        let _ = self
            .active_requests
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(1)));
    }

    pub fn active_requests_count(&self) -> u64 {
        self.active_requests.load(Ordering::Relaxed)
    }

    pub fn increment_num_requests(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_requests_count(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    // --- Latency ---

    pub fn note_response_time(&self, elapsed: Duration) {
        let micros = elapsed.as_micros().min(u64::MAX as u128) as u64;
        self.response_count.fetch_add(1, Ordering::Relaxed);
        self.response_sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.response_min_micros.fetch_min(micros, Ordering::Relaxed);
        self.response_max_micros.fetch_max(micros, Ordering::Relaxed);
    }

    /// Mean response time over every recorded sample.
    pub fn average_response_time(&self) -> Option<Duration> {
        let count = self.response_count.load(Ordering::Relaxed);
        if count == 0 {
            return None;
        }
        let sum = self.response_sum_micros.load(Ordering::Relaxed);
        Some(Duration::from_micros(sum / count))
    }

    pub fn min_response_time(&self) -> Option<Duration> {
        match self.response_min_micros.load(Ordering::Relaxed) {
            u64::MAX => None,
            v => Some(Duration::from_micros(v)),
        }
    }

    pub fn max_response_time(&self) -> Option<Duration> {
        if self.response_count.load(Ordering::Relaxed) == 0 {
            return None;
        }
        Some(Duration::from_micros(self.response_max_micros.load(Ordering::Relaxed)))
    }

    // --- Failures ---

    /// Record any failed call.
    pub fn add_to_failure_count(&self, now: Instant) {
        self.failures.record(now);
    }

    /// Failures within the sliding window ending at `now`.
    pub fn failure_count(&self, now: Instant) -> u64 {
        self.failures.count(now)
    }

    fn millis_since_origin(&self, t: Instant) -> u64 {
        (t.saturating_duration_since(self.origin).as_millis() as u64) & TIMESTAMP_MASK
    }

    /// Record a circuit-tripping failure at `now`.
    pub fn increment_successive_connection_failure_count(&self, now: Instant) {
        let stamp = self.millis_since_origin(now);
        let _ = self.breaker.fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
            let streak = ((word >> STREAK_SHIFT) + 1).min(STREAK_MAX);
            Some((streak << STREAK_SHIFT) | stamp)
        });
    }

    /// Reset the failure streak; the last-failure time is kept.
    pub fn clear_successive_connection_failure_count(&self) {
        let _ = self
            .breaker
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| Some(word & TIMESTAMP_MASK));
    }

    /// Read the streak and the last failure time as one consistent pair.
    fn breaker_state(&self) -> (u32, Option<Instant>) {
        let word = self.breaker.load(Ordering::Acquire);
        let streak = (word >> STREAK_SHIFT) as u32;
        let stamp = word & TIMESTAMP_MASK;
        let last = if streak == 0 && stamp == 0 {
            None
        } else {
            Some(self.origin + Duration::from_millis(stamp))
        };
        (streak, last)
    }

    pub fn successive_connection_failure_count(&self) -> u32 {
        self.breaker_state().0
    }

    pub fn last_connection_failure(&self) -> Option<Instant> {
        self.breaker_state().1
    }

    /// Whether the breaker is open at `now`. Never mutates.
    pub fn is_circuit_breaker_tripped(&self, now: Instant) -> bool {
        let (streak, last) = self.breaker_state();
        match last {
            Some(last) => self.policy.is_tripped(streak, now.saturating_duration_since(last)),
            None => false,
        }
    }

    /// Remaining blackout at `now`, zero when closed.
    pub fn circuit_breaker_remaining(&self, now: Instant) -> Duration {
        let (streak, last) = self.breaker_state();
        match last {
            Some(last) => self
                .policy
                .blackout(streak)
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Serializable copy of the counters at `now`.
    pub fn snapshot(&self, now: Instant) -> ServerStatsSnapshot {
        let millis = |d: Duration| d.as_secs_f64() * 1000.0;
        ServerStatsSnapshot {
            server: self.server.host_port().to_string(),
            active_requests: self.active_requests_count(),
            total_requests: self.total_requests_count(),
            failure_count: self.failure_count(now),
            successive_connection_failures: self.successive_connection_failure_count(),
            circuit_tripped: self.is_circuit_breaker_tripped(now),
            avg_response_ms: self.average_response_time().map(millis),
            min_response_ms: self.min_response_time().map(millis),
            max_response_ms: self.max_response_time().map(millis),
        }
    }
}

/// Point-in-time copy of a server's counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerStatsSnapshot {
    pub server: String,
    pub active_requests: u64,
    pub total_requests: u64,
    pub failure_count: u64,
    pub successive_connection_failures: u32,
    pub circuit_tripped: bool,
    pub avg_response_ms: Option<f64>,
    pub min_response_ms: Option<f64>,
    pub max_response_ms: Option<f64>,
}

/// Immutable membership view of a load balancer.
///
/// The balancer publishes a new value on every membership change; readers
/// holding an older `Arc` keep a consistent picture.
#[derive(Debug, Default)]
pub struct LoadBalancerStats {
    servers: Vec<Arc<ServerStats>>,
    index: HashMap<String, Arc<ServerStats>>,
    temp_down: HashSet<String>,
    ping_dead: HashSet<String>,
    reachable: Vec<Arc<ServerStats>>,
}

impl LoadBalancerStats {
    /// Build a view, dropping set entries for servers that are not known.
    pub(crate) fn build(
        servers: Vec<Arc<ServerStats>>,
        mut temp_down: HashSet<String>,
        mut ping_dead: HashSet<String>,
    ) -> Self {
        let index: HashMap<String, Arc<ServerStats>> = servers
            .iter()
            .map(|s| (s.server().host_port().to_string(), s.clone()))
            .collect();
        temp_down.retain(|k| index.contains_key(k));
        ping_dead.retain(|k| index.contains_key(k));
        let reachable = servers
            .iter()
            .filter(|s| {
                let key = s.server().host_port();
                !temp_down.contains(key) && !ping_dead.contains(key)
            })
            .cloned()
            .collect();
        Self {
            servers,
            index,
            temp_down,
            ping_dead,
            reachable,
        }
    }

    pub(crate) fn stats(&self) -> &[Arc<ServerStats>] {
        &self.servers
    }

    pub(crate) fn stats_by_key(&self, key: &str) -> Option<&Arc<ServerStats>> {
        self.index.get(key)
    }

    pub(crate) fn temp_down_keys(&self) -> &HashSet<String> {
        &self.temp_down
    }

    pub(crate) fn ping_dead_keys(&self) -> &HashSet<String> {
        &self.ping_dead
    }

    /// Reachable records, the only candidates a rule ever sees.
    pub(crate) fn reachable_stats(&self) -> &[Arc<ServerStats>] {
        &self.reachable
    }

    pub fn all_servers(&self) -> Vec<Arc<Server>> {
        self.servers.iter().map(|s| s.server().clone()).collect()
    }

    /// Servers neither temp-down nor ping-dead.
    pub fn reachable_servers(&self) -> Vec<Arc<Server>> {
        self.reachable.iter().map(|s| s.server().clone()).collect()
    }

    pub fn temporarily_down_servers(&self) -> Vec<Arc<Server>> {
        self.filter_servers(&self.temp_down)
    }

    pub fn ping_dead_servers(&self) -> Vec<Arc<Server>> {
        self.filter_servers(&self.ping_dead)
    }

    fn filter_servers(&self, keys: &HashSet<String>) -> Vec<Arc<Server>> {
        self.servers
            .iter()
            .filter(|s| keys.contains(s.server().host_port()))
            .map(|s| s.server().clone())
            .collect()
    }

    pub fn is_temporarily_down(&self, server: &Server) -> bool {
        self.temp_down.contains(server.host_port())
    }

    pub fn is_ping_dead(&self, server: &Server) -> bool {
        self.ping_dead.contains(server.host_port())
    }

    /// Stats of a known server, or `None` if it is not (or no longer) known.
    pub fn single_server_stats(&self, server: &Server) -> Option<Arc<ServerStats>> {
        self.index.get(server.host_port()).cloned()
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    pub fn reachable_count(&self) -> usize {
        self.reachable.len()
    }

    pub fn snapshots(&self, now: Instant) -> Vec<ServerStatsSnapshot> {
        self.servers.iter().map(|s| s.snapshot(now)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(threshold: u32) -> ServerStats {
        let policy = CircuitBreakerPolicy::new(threshold, Duration::from_secs(10), Duration::from_secs(30));
        ServerStats::new(
            Arc::new(Server::new("http", "127.0.0.1", 8080)),
            policy,
            Duration::from_secs(10),
        )
    }

    #[test]
    fn test_active_count_never_negative() {
        let s = stats(3);
        s.decrement_active_requests_count();
        assert_eq!(s.active_requests_count(), 0);
        s.increment_active_requests_count();
        s.increment_active_requests_count();
        s.decrement_active_requests_count();
        assert_eq!(s.active_requests_count(), 1);
    }

    #[test]
    fn test_response_times() {
        let s = stats(3);
        assert!(s.average_response_time().is_none());
        s.note_response_time(Duration::from_millis(10));
        s.note_response_time(Duration::from_millis(30));
        assert_eq!(s.average_response_time(), Some(Duration::from_millis(20)));
        assert_eq!(s.min_response_time(), Some(Duration::from_millis(10)));
        assert_eq!(s.max_response_time(), Some(Duration::from_millis(30)));
    }

    #[test]
    fn test_trip_scenario() {
        // threshold=3, factor=10s, max=30s; failures at t=0,1,2s
        let s = stats(3);
        let t0 = Instant::now();
        for i in 0..3 {
            s.increment_successive_connection_failure_count(t0 + Duration::from_secs(i));
        }
        assert!(s.is_circuit_breaker_tripped(t0 + Duration::from_secs(2)));
        assert!(s.is_circuit_breaker_tripped(t0 + Duration::from_secs(31)));
        assert!(!s.is_circuit_breaker_tripped(t0 + Duration::from_secs(33)));
        // expiry does not reset the streak
        assert_eq!(s.successive_connection_failure_count(), 3);
    }

    #[test]
    fn test_success_clears_trip_immediately() {
        let s = stats(3);
        let t0 = Instant::now();
        for i in 0..3 {
            s.increment_successive_connection_failure_count(t0 + Duration::from_secs(i));
        }
        let t10 = t0 + Duration::from_secs(10);
        assert!(s.is_circuit_breaker_tripped(t10));
        s.clear_successive_connection_failure_count();
        assert!(!s.is_circuit_breaker_tripped(t10));
        assert_eq!(s.successive_connection_failure_count(), 0);
        assert!(s.last_connection_failure().is_some());
    }

    #[test]
    fn test_tripped_query_is_pure() {
        let s = stats(1);
        let t0 = Instant::now();
        s.increment_successive_connection_failure_count(t0);
        for _ in 0..10 {
            assert!(s.is_circuit_breaker_tripped(t0));
        }
        assert_eq!(s.successive_connection_failure_count(), 1);
    }

    #[test]
    fn test_concurrent_counters() {
        let s = Arc::new(stats(3));
        let t0 = Instant::now();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let s = s.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        s.increment_active_requests_count();
                        s.increment_num_requests();
                        s.increment_successive_connection_failure_count(t0);
                        s.decrement_active_requests_count();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(s.active_requests_count(), 0);
        assert_eq!(s.total_requests_count(), 2000);
        assert_eq!(s.successive_connection_failure_count(), 2000);
    }

    #[test]
    fn test_view_keeps_sets_consistent() {
        let a = Arc::new(stats(3));
        let b = Arc::new(ServerStats::new(
            Arc::new(Server::new("http", "127.0.0.1", 8081)),
            CircuitBreakerPolicy::default(),
            Duration::from_secs(10),
        ));
        let temp_down: HashSet<String> = ["127.0.0.1:8080".to_string(), "gone:1".to_string()].into();
        let view = LoadBalancerStats::build(vec![a.clone(), b.clone()], temp_down, HashSet::new());

        assert_eq!(view.server_count(), 2);
        assert_eq!(view.reachable_servers(), vec![b.server().clone()]);
        assert_eq!(view.temporarily_down_servers(), vec![a.server().clone()]);
        // entries for unknown servers are dropped
        assert_eq!(view.temp_down_keys().len(), 1);
        assert!(view.single_server_stats(&Server::new("http", "gone", 1)).is_none());
    }
}
