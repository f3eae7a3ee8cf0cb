//! Endpoint set providers.
//!
//! # Data Flow
//! ```text
//! config (static endpoints) ──▶ ServiceDirectory::upsert(route, endpoints)
//!                                   → ServiceEndpoints (ArcSwap<Vec<Endpoint>>)
//!                                   → handed to balancers as Arc<dyn EndpointProvider>
//!
//! Balancer::lease()
//!     → EndpointProvider::current_endpoints()  (lock-free snapshot)
//! ```
//!
//! # Design Decisions
//! - Providers are read-only from the balancer's point of view
//! - A reload replaces the whole set atomically; balancers observe it on their next lease
//! - One provider per route name, so a balancer keeps its state across reloads
//!   that only change endpoints

use std::fmt;
use std::sync::Arc;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use crate::load_balancer::endpoint::{Endpoint, EndpointSet};

/// Source of the current endpoint set for a route.
pub trait EndpointProvider: Send + Sync + fmt::Debug {
    /// Snapshot of the endpoints eligible right now. May be empty.
    fn current_endpoints(&self) -> EndpointSet;
}

/// A live, atomically replaceable endpoint set.
pub struct ServiceEndpoints {
    name: String,
    endpoints: ArcSwap<Vec<Endpoint>>,
}

impl ServiceEndpoints {
    pub fn new(name: impl Into<String>, endpoints: Vec<Endpoint>) -> Self {
        Self {
            name: name.into(),
            endpoints: ArcSwap::from_pointee(endpoints),
        }
    }

    /// Swap in a new endpoint set.
    pub fn replace(&self, endpoints: Vec<Endpoint>) {
        tracing::debug!(service = %self.name, count = endpoints.len(), "Endpoint set replaced");
        self.endpoints.store(Arc::new(endpoints));
    }
}

impl fmt::Debug for ServiceEndpoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceEndpoints")
            .field("name", &self.name)
            .field("endpoints", &**self.endpoints.load())
            .finish()
    }
}

impl EndpointProvider for ServiceEndpoints {
    fn current_endpoints(&self) -> EndpointSet {
        self.endpoints.load_full()
    }
}

/// Route name → endpoint provider.
#[derive(Debug, Default)]
pub struct ServiceDirectory {
    services: DashMap<String, Arc<ServiceEndpoints>>,
}

impl ServiceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the endpoints for `name` in place, or register a new provider.
    pub fn upsert(&self, name: &str, endpoints: Vec<Endpoint>) -> Arc<ServiceEndpoints> {
        if let Some(existing) = self.services.get(name) {
            existing.replace(endpoints);
            return existing.clone();
        }

        self.services
            .entry(name.to_string())
            .and_modify(|existing| existing.replace(endpoints.clone()))
            .or_insert_with(|| Arc::new(ServiceEndpoints::new(name, endpoints.clone())))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<ServiceEndpoints>> {
        self.services.get(name).map(|s| s.clone())
    }

    /// Drop every provider whose name is not in `names`.
    pub fn retain_names(&self, names: &[&str]) {
        self.services.retain(|name, _| names.contains(&name.as_str()));
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
