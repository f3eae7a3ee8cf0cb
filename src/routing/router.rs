//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up matching route for request
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks); reloads build a new Router
//! - O(n) scan, ordered by priority then longest path prefix
//! - Explicit None rather than silent default

use std::sync::Arc;
use crate::config::RouteConfig;
use crate::discovery::{EndpointProvider, ServiceDirectory};
use crate::load_balancer::RouteKey;
use crate::pipeline::DownstreamRoute;
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher, RequestInfo};

/// A route ready to be matched and balanced.
#[derive(Debug)]
pub struct CompiledRoute {
    pub name: String,
    pub scheme: String,
    pub priority: u32,
    prefix_len: usize,
    matcher: AndMatcher,
    downstream: DownstreamRoute,
}

impl CompiledRoute {
    pub fn key(&self) -> &RouteKey {
        &self.downstream.key
    }

    /// The route key and endpoint source handed to the pipeline.
    pub fn downstream(&self) -> DownstreamRoute {
        self.downstream.clone()
    }
}

/// Ordered set of compiled routes.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<CompiledRoute>,
}

impl Router {
    /// Compile routes, registering their endpoints in `directory`.
    pub fn from_config(routes: &[RouteConfig], directory: &ServiceDirectory) -> Self {
        let mut compiled: Vec<CompiledRoute> = routes
            .iter()
            .map(|route| {
                let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
                if let Some(host) = &route.host {
                    matchers.push(Box::new(HostMatcher::new(host.as_str())));
                }
                let prefix = PathPrefixMatcher::new(route.path_prefix.as_str());
                let prefix_len = prefix.len();
                matchers.push(Box::new(prefix));

                let provider = directory.upsert(&route.name, route.downstream_endpoints());
                let endpoints: Arc<dyn EndpointProvider> = provider;

                CompiledRoute {
                    name: route.name.clone(),
                    scheme: route.scheme.clone(),
                    priority: route.priority,
                    prefix_len,
                    matcher: AndMatcher::new(matchers),
                    downstream: DownstreamRoute::new(route.route_key(), endpoints),
                }
            })
            .collect();

        compiled.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.prefix_len.cmp(&a.prefix_len))
        });

        Self { routes: compiled }
    }

    /// First route matching the request, if any.
    pub fn match_request(&self, host: Option<&str>, path: &str) -> Option<&CompiledRoute> {
        let req = RequestInfo { host, path };
        self.routes.iter().find(|r| r.matcher.matches(&req))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
