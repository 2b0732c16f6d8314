//! Round-robin selection rule.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use crate::load_balancer::{Rule, stats::ServerStats};

/// Round-robin selector.
/// Stores an internal counter to rotate through the candidates.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Rule for RoundRobin {
    fn choose(&self, candidates: &[Arc<ServerStats>], _key: Option<&str>) -> Option<Arc<ServerStats>> {
        if candidates.is_empty() {
            return None;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Some(candidates[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::test_support::candidate;

    #[test]
    fn test_round_robin() {
        let rule = RoundRobin::new();
        let b1 = candidate(8080);
        let b2 = candidate(8081);
        let candidates = vec![b1.clone(), b2.clone()];

        let s1 = rule.choose(&candidates, None).unwrap();
        assert_eq!(s1.server(), b1.server());

        let s2 = rule.choose(&candidates, None).unwrap();
        assert_eq!(s2.server(), b2.server());

        let s3 = rule.choose(&candidates, None).unwrap();
        assert_eq!(s3.server(), b1.server());
    }

    #[test]
    fn test_empty() {
        assert!(RoundRobin::new().choose(&[], None).is_none());
    }
}
