//! Load balancer registry.
//!
//! # Responsibilities
//! - Own one balancer per route key
//! - Create balancers on first access, reuse them afterwards
//! - Evict balancers whose configuration went away
//!
//! # Design Decisions
//! - Sharded map (DashMap): lookups for unrelated keys never wait on each other
//! - Creation goes through the entry API under the shard lock, so concurrent
//!   first access for one key builds exactly one balancer
//! - A balancer is tied to the provider it was built from; a lookup with a
//!   different provider for the same key replaces it
//! - Evicted balancers stay alive while leases hold them

use std::sync::Arc;
use dashmap::{mapref::entry::Entry, DashMap};
use crate::discovery::EndpointProvider;
use crate::load_balancer::{
    balancer::LoadBalancer,
    error::LoadBalancerError,
    key::RouteKey,
};
use crate::observability::metrics;

/// Shared registry of balancers, injected wherever balancers are resolved.
#[derive(Debug, Default)]
pub struct LoadBalancerHouse {
    balancers: DashMap<RouteKey, Arc<LoadBalancer>>,
}

impl LoadBalancerHouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the balancer for `key`, creating it from `endpoints` if needed.
    ///
    /// A cached balancer bound to a different provider than `endpoints` is
    /// stale (its route was removed and added back) and gets replaced.
    pub fn get(
        &self,
        key: &RouteKey,
        endpoints: &Arc<dyn EndpointProvider>,
    ) -> Result<Arc<LoadBalancer>, LoadBalancerError> {
        if let Some(existing) = self.balancers.get(key) {
            if existing.uses_provider(endpoints) {
                return Ok(existing.value().clone());
            }
        }

        match self.balancers.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().uses_provider(endpoints) {
                    return Ok(occupied.get().clone());
                }
                match Self::create(key, endpoints) {
                    Ok(balancer) => {
                        tracing::info!(key = %key, "Stale load balancer replaced");
                        metrics::record_balancer_evicted(1);
                        occupied.insert(balancer.clone());
                        Ok(balancer)
                    }
                    Err(e) => {
                        occupied.remove();
                        metrics::record_balancer_evicted(1);
                        Err(e)
                    }
                }
            }
            Entry::Vacant(vacant) => {
                let balancer = Self::create(key, endpoints)?;
                vacant.insert(balancer.clone());
                Ok(balancer)
            }
        }
    }

    fn create(
        key: &RouteKey,
        endpoints: &Arc<dyn EndpointProvider>,
    ) -> Result<Arc<LoadBalancer>, LoadBalancerError> {
        match LoadBalancer::new(key.clone(), endpoints.clone()) {
            Ok(balancer) => {
                tracing::info!(key = %key, strategy = %balancer.kind(), "Load balancer created");
                metrics::record_balancer_created(balancer.kind().as_str());
                Ok(Arc::new(balancer))
            }
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "Load balancer creation failed");
                metrics::record_lease_failure(key.route(), "creation");
                Err(e)
            }
        }
    }

    /// Drop the balancer registered for `key`.
    pub fn evict(&self, key: &RouteKey) -> Option<Arc<LoadBalancer>> {
        let (_, balancer) = self.balancers.remove(key)?;
        tracing::info!(key = %key, "Load balancer evicted");
        metrics::record_balancer_evicted(1);
        Some(balancer)
    }

    /// Drop every balancer registered under route name `route`.
    pub fn evict_route(&self, route: &str) -> usize {
        self.retain(|key| key.route() != route)
    }

    /// Keep only balancers whose key satisfies `keep`. Returns the number evicted.
    pub fn retain(&self, mut keep: impl FnMut(&RouteKey) -> bool) -> usize {
        let mut evicted = 0;
        self.balancers.retain(|key, _| {
            let retained = keep(key);
            if !retained {
                tracing::info!(key = %key, "Load balancer evicted");
                evicted += 1;
            }
            retained
        });
        if evicted > 0 {
            metrics::record_balancer_evicted(evicted as u64);
        }
        evicted
    }

    pub fn contains(&self, key: &RouteKey) -> bool {
        self.balancers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.balancers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balancers.is_empty()
    }
}
