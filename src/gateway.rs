//! Shared gateway state: routes, endpoint providers and the balancer house.
//!
//! # Data Flow
//! ```text
//! GatewayConfig
//!     → ServiceDirectory (endpoint sets, updated in place)
//!     → Router (rebuilt, swapped atomically)
//!     → LoadBalancerHouse (keys no longer configured are evicted)
//! ```
//!
//! # Design Decisions
//! - Handlers take a cheap `Arc<Router>` snapshot per request
//! - A balancer survives a reload when its route key is unchanged; it sees
//!   the new endpoints on its next lease
//! - Leases held by in-flight requests keep evicted balancers alive

use std::collections::HashSet;
use std::sync::Arc;
use arc_swap::ArcSwap;
use crate::config::GatewayConfig;
use crate::discovery::ServiceDirectory;
use crate::load_balancer::{LoadBalancerHouse, RouteKey};
use crate::routing::Router;

#[derive(Debug)]
pub struct Gateway {
    router: ArcSwap<Router>,
    directory: Arc<ServiceDirectory>,
    house: Arc<LoadBalancerHouse>,
}

impl Gateway {
    pub fn new(config: &GatewayConfig) -> Self {
        let directory = Arc::new(ServiceDirectory::new());
        let router = Router::from_config(&config.routes, &directory);
        tracing::info!(routes = router.len(), "Gateway routes loaded");

        Self {
            router: ArcSwap::from_pointee(router),
            directory,
            house: Arc::new(LoadBalancerHouse::new()),
        }
    }

    /// Current routing table.
    pub fn router(&self) -> Arc<Router> {
        self.router.load_full()
    }

    pub fn directory(&self) -> &Arc<ServiceDirectory> {
        &self.directory
    }

    pub fn house(&self) -> &Arc<LoadBalancerHouse> {
        &self.house
    }

    /// Apply a reloaded configuration.
    pub fn apply_config(&self, config: &GatewayConfig) {
        let router = Router::from_config(&config.routes, &self.directory);

        let live_keys: HashSet<RouteKey> = config.routes.iter().map(|r| r.route_key()).collect();
        let live_names: Vec<&str> = config.routes.iter().map(|r| r.name.as_str()).collect();

        let route_count = router.len();
        self.router.store(Arc::new(router));
        let evicted = self.house.retain(|key| live_keys.contains(key));
        self.directory.retain_names(&live_names);

        tracing::info!(routes = route_count, evicted, "Configuration applied");
    }
}
