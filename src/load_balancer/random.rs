//! Uniform random selection rule.

use std::sync::Arc;
use rand::Rng;
use crate::load_balancer::{Rule, stats::ServerStats};

/// Picks a candidate uniformly at random.
#[derive(Debug, Default)]
pub struct RandomRule;

impl RandomRule {
    pub fn new() -> Self {
        Self
    }
}

impl Rule for RandomRule {
    fn choose(&self, candidates: &[Arc<ServerStats>], _key: Option<&str>) -> Option<Arc<ServerStats>> {
        if candidates.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..candidates.len());
        Some(candidates[index].clone())
    }
}
