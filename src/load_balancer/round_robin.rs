//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use crate::load_balancer::endpoint::Endpoint;

/// Round-robin selector.
/// Stores an internal cursor to rotate through the current endpoint set.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the next endpoint. Each call claims a distinct cursor value, and
    /// the index is taken modulo the set length at the time of the call, so a
    /// shrinking set never indexes out of range.
    pub fn select(&self, endpoints: &[Endpoint]) -> Option<Endpoint> {
        if endpoints.is_empty() {
            return None;
        }

        let position = self.cursor.fetch_add(1, Ordering::Relaxed);
        endpoints.get(position % endpoints.len()).cloned()
    }
}
