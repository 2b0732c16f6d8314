//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! ServerListSource (refresh tick)
//!     → balancer.rs (add new Server/Stats, drop vanished ones)
//!     → publish new LoadBalancerStats snapshot
//!
//! choose_server(routing key)
//!     → load current snapshot (lock-free)
//!     → reachable set (not temp-down, not ping-dead)
//!     → Rule::choose:
//!         - random.rs (uniform pick)
//!         - round_robin.rs (rotate through candidates)
//!         - least_conn.rs (fewest active requests)
//!         - key_hash.rs (routing key → stable server)
//!     → Server or BalancerError::NoServerAvailable
//! ```
//!
//! # Design Decisions
//! - Membership is an immutable snapshot swapped on change; selection never locks
//! - Per-server counters live in `ServerStats` and are updated atomically
//! - Rules only ever see reachable candidates
//! - Rule selection per client, from configuration

pub mod balancer;
pub mod key_hash;
pub mod least_conn;
pub mod random;
pub mod round_robin;
pub mod server;
pub mod stats;

use std::sync::Arc;
use crate::config::RuleKind;

pub use balancer::LoadBalancer;
pub use server::Server;
pub use stats::{LoadBalancerStats, ServerStats, ServerStatsSnapshot};

/// Server selection policy.
pub trait Rule: Send + Sync + std::fmt::Debug {
    /// Pick one of `candidates`, optionally biased by a routing key.
    /// Returns `None` only when `candidates` is empty.
    fn choose(&self, candidates: &[Arc<ServerStats>], key: Option<&str>) -> Option<Arc<ServerStats>>;
}

/// Build the rule named by configuration.
pub fn rule_for(kind: RuleKind) -> Box<dyn Rule> {
    match kind {
        RuleKind::Random => Box::new(random::RandomRule::new()),
        RuleKind::RoundRobin => Box::new(round_robin::RoundRobin::new()),
        RuleKind::LeastConnections => Box::new(least_conn::LeastConnections::new()),
        RuleKind::KeyHash => Box::new(key_hash::KeyHash::new()),
    }
}
