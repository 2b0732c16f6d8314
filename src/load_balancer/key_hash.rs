//! Routing-key hash selection rule.
//!
//! Requests carrying the same routing key land on the same server as long as
//! the reachable set does not change. Requests without a key rotate.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use crate::load_balancer::{Rule, round_robin::RoundRobin, stats::ServerStats};

/// Hashes the routing key onto the candidates ordered by `host:port`.
#[derive(Debug, Default)]
pub struct KeyHash {
    fallback: RoundRobin,
}

impl KeyHash {
    pub fn new() -> Self {
        Self::default()
    }

    fn hash_key(key: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }
}

impl Rule for KeyHash {
    fn choose(&self, candidates: &[Arc<ServerStats>], key: Option<&str>) -> Option<Arc<ServerStats>> {
        let key = match key {
            Some(k) => k,
            None => return self.fallback.choose(candidates, None),
        };
        if candidates.is_empty() {
            return None;
        }

        // Sort for an order independent of discovery order
        let mut sorted: Vec<&Arc<ServerStats>> = candidates.iter().collect();
        sorted.sort_by(|a, b| a.server().host_port().cmp(b.server().host_port()));

        let index = (Self::hash_key(key) % sorted.len() as u64) as usize;
        Some(sorted[index].clone())
    }
}
