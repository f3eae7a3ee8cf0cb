//! Per-route load balancer: strategy dispatch and lease bookkeeping.

use std::sync::Arc;
use crate::discovery::EndpointProvider;
use crate::load_balancer::{
    endpoint::Endpoint,
    error::{CreationError, LoadBalancerError},
    key::{BalancerKind, RouteKey},
    lease::Lease,
    least_outstanding::LeastOutstanding,
    no_balancing::NoBalancing,
    round_robin::RoundRobin,
};
use crate::observability::metrics;

/// The closed set of selection algorithms.
#[derive(Debug)]
pub enum Strategy {
    RoundRobin(RoundRobin),
    LeastOutstanding(LeastOutstanding),
    NoBalancing(NoBalancing),
}

impl Strategy {
    pub fn new(kind: BalancerKind) -> Self {
        match kind {
            BalancerKind::RoundRobin => Strategy::RoundRobin(RoundRobin::new()),
            BalancerKind::LeastOutstanding => Strategy::LeastOutstanding(LeastOutstanding::new()),
            BalancerKind::NoBalancing => Strategy::NoBalancing(NoBalancing::new()),
        }
    }

    pub fn kind(&self) -> BalancerKind {
        match self {
            Strategy::RoundRobin(_) => BalancerKind::RoundRobin,
            Strategy::LeastOutstanding(_) => BalancerKind::LeastOutstanding,
            Strategy::NoBalancing(_) => BalancerKind::NoBalancing,
        }
    }
}

/// A stateful balancer bound to one route key and its endpoint provider.
#[derive(Debug)]
pub struct LoadBalancer {
    key: RouteKey,
    endpoints: Arc<dyn EndpointProvider>,
    strategy: Strategy,
}

fn creation_error(key: &RouteKey, source: CreationError) -> LoadBalancerError {
    LoadBalancerError::Creation {
        route: key.route().to_string(),
        source,
    }
}

impl LoadBalancer {
    /// Build the balancer described by the key's options.
    ///
    /// Fails on an unknown kind or when the provider has no endpoints yet.
    pub fn new(key: RouteKey, endpoints: Arc<dyn EndpointProvider>) -> Result<Self, LoadBalancerError> {
        let kind = key
            .options()
            .kind()
            .map_err(|e| creation_error(&key, e.into()))?;

        let current = endpoints.current_endpoints();
        if current.is_empty() {
            let route = key.route().to_string();
            return Err(creation_error(&key, CreationError::EmptyEndpointSet { route }));
        }

        if kind == BalancerKind::NoBalancing && current.len() > 1 {
            tracing::warn!(
                route = %key.route(),
                endpoints = current.len(),
                "no_balancing route has several endpoints, only the first is used"
            );
        }

        Ok(Self {
            key,
            endpoints,
            strategy: Strategy::new(kind),
        })
    }

    /// Whether this balancer reads its endpoints from `provider`.
    pub fn uses_provider(&self, provider: &Arc<dyn EndpointProvider>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.endpoints), Arc::as_ptr(provider))
    }

    pub fn key(&self) -> &RouteKey {
        &self.key
    }

    pub fn kind(&self) -> BalancerKind {
        self.strategy.kind()
    }

    /// Select an endpoint from the provider's current set.
    pub fn lease(self: &Arc<Self>) -> Result<Lease, LoadBalancerError> {
        let endpoints = self.endpoints.current_endpoints();
        let selected = match &self.strategy {
            Strategy::RoundRobin(rr) => rr.select(&endpoints),
            Strategy::LeastOutstanding(lo) => lo.acquire(&endpoints),
            Strategy::NoBalancing(nb) => nb.select(&endpoints),
        };

        let route = self.key.route();
        match selected {
            Some(endpoint) => {
                tracing::debug!(route = %route, endpoint = %endpoint, strategy = %self.kind(), "Endpoint leased");
                metrics::record_lease(route, self.kind().as_str());
                Ok(Lease::new(self.clone(), endpoint))
            }
            None => {
                tracing::debug!(route = %route, strategy = %self.kind(), "No endpoints available");
                metrics::record_lease_failure(route, "no_endpoints");
                Err(LoadBalancerError::NoEndpointsAvailable {
                    route: route.to_string(),
                })
            }
        }
    }

    /// Return a lease. Releasing a lease twice, or into a balancer that did
    /// not issue it, is logged and leaves all counters untouched.
    pub fn release(&self, lease: &mut Lease) {
        if !std::ptr::eq(Arc::as_ptr(lease.balancer()), self) {
            tracing::error!(
                route = %self.key.route(),
                lease_route = %lease.balancer().key().route(),
                endpoint = %lease.endpoint(),
                "Lease released into a balancer that did not issue it, ignoring"
            );
            return;
        }

        if !lease.disarm() {
            let err = LoadBalancerError::DoubleRelease {
                route: self.key.route().to_string(),
                endpoint: lease.endpoint().to_string(),
            };
            tracing::error!(error = %err, "Defect: lease released twice");
            metrics::record_double_release(self.key.route());
            return;
        }

        if let Strategy::LeastOutstanding(lo) = &self.strategy {
            if !lo.release(lease.endpoint()) {
                tracing::warn!(
                    route = %self.key.route(),
                    endpoint = %lease.endpoint(),
                    "Released endpoint had no outstanding lease"
                );
            }
        }

        metrics::record_release(self.key.route(), self.kind().as_str());
    }

    /// Outstanding lease counts per endpoint. Empty for strategies that do
    /// not track them.
    pub fn outstanding(&self) -> Vec<(Endpoint, usize)> {
        match &self.strategy {
            Strategy::LeastOutstanding(lo) => lo.snapshot(),
            _ => Vec::new(),
        }
    }

    pub fn total_outstanding(&self) -> usize {
        match &self.strategy {
            Strategy::LeastOutstanding(lo) => lo.total_outstanding(),
            _ => 0,
        }
    }
}
