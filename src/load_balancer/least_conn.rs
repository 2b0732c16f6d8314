//! Least-connections selection rule.

use std::sync::Arc;
use crate::load_balancer::{Rule, stats::ServerStats};

/// Least connections selector.
/// Selects the candidate with the fewest in-flight requests.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl Rule for LeastConnections {
    fn choose(&self, candidates: &[Arc<ServerStats>], _key: Option<&str>) -> Option<Arc<ServerStats>> {
        // In case of tie, the first one is selected (stability)
        candidates
            .iter()
            .min_by_key(|s| s.active_requests_count())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::test_support::candidate;

    #[test]
    fn test_least_conn() {
        let rule = LeastConnections::new();
        let b1 = candidate(8080);
        let b2 = candidate(8081);

        b1.increment_active_requests_count();

        let candidates = vec![b1.clone(), b2.clone()];

        // Should pick b2 (0 in flight)
        let s1 = rule.choose(&candidates, None).unwrap();
        assert_eq!(s1.server(), b2.server());

        b2.increment_active_requests_count();
        b2.increment_active_requests_count(); // now b2 has 2, b1 has 1

        let s2 = rule.choose(&candidates, None).unwrap();
        assert_eq!(s2.server(), b1.server());
    }
}
