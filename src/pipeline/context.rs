//! Per-request downstream context.

use std::fmt;
use std::sync::Arc;
use axum::http::{uri::Authority, uri::PathAndQuery, Uri};
use uuid::Uuid;
use crate::discovery::EndpointProvider;
use crate::load_balancer::{Endpoint, RouteKey};
use crate::pipeline::PipelineError;

/// A resolved downstream route: the registry key plus the endpoint source.
#[derive(Debug, Clone)]
pub struct DownstreamRoute {
    pub key: RouteKey,
    pub endpoints: Arc<dyn EndpointProvider>,
}

impl DownstreamRoute {
    pub fn new(key: RouteKey, endpoints: Arc<dyn EndpointProvider>) -> Self {
        Self { key, endpoints }
    }
}

/// The mutable target of the in-flight downstream request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownstreamTarget {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    pub path_and_query: String,
}

impl DownstreamTarget {
    /// A target with no authority yet; the load balancer fills it in.
    pub fn new(scheme: impl Into<String>, path_and_query: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            host: String::new(),
            port: None,
            path_and_query: path_and_query.into(),
        }
    }

    pub fn from_uri(uri: &Uri) -> Self {
        Self {
            scheme: uri.scheme_str().unwrap_or("http").to_string(),
            host: uri
                .host()
                .unwrap_or_default()
                .trim_start_matches('[')
                .trim_end_matches(']')
                .to_string(),
            port: uri.port_u16(),
            path_and_query: uri
                .path_and_query()
                .map(PathAndQuery::as_str)
                .unwrap_or("/")
                .to_string(),
        }
    }

    /// Point the target at a leased endpoint. The port is only replaced when
    /// the endpoint carries one.
    pub fn apply(&mut self, endpoint: &Endpoint) {
        self.host = endpoint.host().to_string();
        if let Some(port) = endpoint.port() {
            self.port = Some(port);
        }
    }

    pub fn authority(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        match self.port {
            Some(port) => format!("{host}:{port}"),
            None => host,
        }
    }

    pub fn to_uri(&self) -> Result<Uri, axum::http::Error> {
        let authority: Authority = self.authority().parse()?;
        let path = if self.path_and_query.is_empty() {
            "/"
        } else {
            self.path_and_query.as_str()
        };
        Ok(Uri::builder()
            .scheme(self.scheme.as_str())
            .authority(authority)
            .path_and_query(path)
            .build()?)
    }
}

impl fmt::Display for DownstreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority(), self.path_and_query)
    }
}

/// Where a request is in its traversal of the load balancing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalancingState {
    Unresolved,
    Resolved,
    Leased,
    Forwarded,
    Released,
    ResolutionFailed,
    LeaseFailed,
}

/// State shared by all stages for one request.
///
/// `X` is the transport payload carried alongside (the HTTP exchange in the
/// server, `()` where no transport is involved).
#[derive(Debug)]
pub struct DownstreamContext<X = ()> {
    pub request_id: Uuid,
    pub route: DownstreamRoute,
    pub target: DownstreamTarget,
    pub errors: Vec<PipelineError>,
    pub state: BalancingState,
    pub exchange: X,
}

impl<X> DownstreamContext<X> {
    pub fn new(route: DownstreamRoute, target: DownstreamTarget, exchange: X) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            route,
            target,
            errors: Vec::new(),
            state: BalancingState::Unresolved,
            exchange,
        }
    }

    /// Record an error on the context's error channel.
    pub fn set_pipeline_error(&mut self, error: impl Into<PipelineError>) {
        self.errors.push(error.into());
    }

    pub fn is_error(&self) -> bool {
        !self.errors.is_empty()
    }
}
