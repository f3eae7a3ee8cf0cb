//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Reject unknown balancer kinds before any request hits them
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use crate::config::schema::GatewayConfig;
use crate::load_balancer::BalancerKind;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("route #{index} has an empty name")]
    EmptyRouteName { index: usize },

    #[error("route `{0}` is defined more than once")]
    DuplicateRoute(String),

    #[error("route `{route}`: path prefix `{prefix}` must start with '/'")]
    InvalidPathPrefix { route: String, prefix: String },

    #[error("route `{0}` has no endpoints")]
    NoEndpoints(String),

    #[error("route `{0}` has an endpoint with an empty host")]
    EmptyEndpointHost(String),

    #[error("route `{route}`: port {port} is out of range")]
    PortOutOfRange { route: String, port: i64 },

    #[error("route `{route}`: unknown load balancer kind `{kind}`")]
    UnknownBalancer { route: String, kind: String },

    #[error("timeout `{0}` must be greater than zero")]
    ZeroTimeout(&'static str),
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut names = HashSet::new();

    for (index, route) in config.routes.iter().enumerate() {
        if route.name.trim().is_empty() {
            errors.push(ValidationError::EmptyRouteName { index });
        } else if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.name.clone()));
        }

        if !route.path_prefix.starts_with('/') {
            errors.push(ValidationError::InvalidPathPrefix {
                route: route.name.clone(),
                prefix: route.path_prefix.clone(),
            });
        }

        if route.endpoints.is_empty() {
            errors.push(ValidationError::NoEndpoints(route.name.clone()));
        }

        for endpoint in &route.endpoints {
            if endpoint.host.trim().is_empty() {
                errors.push(ValidationError::EmptyEndpointHost(route.name.clone()));
            }
            if endpoint.port > i64::from(u16::MAX) {
                errors.push(ValidationError::PortOutOfRange {
                    route: route.name.clone(),
                    port: endpoint.port,
                });
            }
        }

        if route.load_balancer.kind.parse::<BalancerKind>().is_err() {
            errors.push(ValidationError::UnknownBalancer {
                route: route.name.clone(),
                kind: route.load_balancer.kind.clone(),
            });
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("request_secs"));
    }
    if config.timeouts.downstream_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("downstream_secs"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
