//! Pass-through strategy for single-target routes.

use crate::load_balancer::endpoint::Endpoint;

/// Always hands out the first endpoint of the set.
#[derive(Debug, Default)]
pub struct NoBalancing;

impl NoBalancing {
    pub fn new() -> Self {
        Self
    }

    pub fn select(&self, endpoints: &[Endpoint]) -> Option<Endpoint> {
        endpoints.first().cloned()
    }
}
