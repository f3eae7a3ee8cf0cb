//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use crate::load_balancer::{BalancerOptions, Endpoint, RouteKey, StickySessions};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Route definitions mapping requests to downstream endpoints.
    pub routes: Vec<RouteConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Route configuration mapping requests to a set of downstream endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier, also the load balancer key's route name.
    pub name: String,

    /// Host header to match (exact match).
    #[serde(default)]
    pub host: Option<String>,

    /// Path prefix to match.
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,

    /// Downstream scheme.
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,

    /// Balancing strategy for this route.
    #[serde(default)]
    pub load_balancer: LoadBalancerConfig,

    /// Downstream candidates.
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

fn default_path_prefix() -> String {
    "/".to_string()
}

fn default_scheme() -> String {
    "http".to_string()
}

impl RouteConfig {
    /// The registry key for this route's current balancing configuration.
    pub fn route_key(&self) -> RouteKey {
        RouteKey::new(self.name.as_str(), self.load_balancer.options())
    }

    /// Endpoints with non-positive ports normalized to "inherit".
    /// Out-of-range ports are rejected by validation beforehand.
    pub fn downstream_endpoints(&self) -> Vec<Endpoint> {
        self.endpoints
            .iter()
            .map(|e| Endpoint::new(e.host.as_str(), u16::try_from(e.port.max(0)).unwrap_or(0)))
            .collect()
    }
}

/// Load balancer selection for a route.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    /// `round_robin`, `least_outstanding` or `no_balancing` (default).
    pub kind: String,

    /// Optional session affinity settings.
    pub sticky: Option<StickyConfig>,
}

impl LoadBalancerConfig {
    pub fn options(&self) -> BalancerOptions {
        let options = BalancerOptions::new(&self.kind);
        match &self.sticky {
            Some(sticky) => options.with_sticky(StickySessions {
                key: sticky.key.clone(),
                expiry_ms: sticky.expiry_ms,
            }),
            None => options,
        }
    }
}

/// Session affinity settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StickyConfig {
    pub key: String,
    #[serde(default)]
    pub expiry_ms: u64,
}

/// One downstream endpoint. A port `<= 0` keeps the request's port.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    pub host: String,
    #[serde(default)]
    pub port: i64,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Timeout for the downstream call in seconds.
    pub downstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            downstream_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [listener]
        bind_address = "127.0.0.1:9000"

        [[routes]]
        name = "orders"
        path_prefix = "/orders"
        [routes.load_balancer]
        kind = "LeastConnection"
        sticky = { key = "session", expiry_ms = 60000 }
        [[routes.endpoints]]
        host = "10.0.0.1"
        port = 8080
        [[routes.endpoints]]
        host = "10.0.0.2"
        port = -1

        [[routes]]
        name = "static"
        [[routes.endpoints]]
        host = "cdn"
    "#;

    #[test]
    fn test_parse_sample() {
        let config: GatewayConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.timeouts.request_secs, 30);
        assert_eq!(config.routes.len(), 2);

        let orders = &config.routes[0];
        assert_eq!(
            orders.downstream_endpoints(),
            vec![Endpoint::new("10.0.0.1", 8080), Endpoint::host_only("10.0.0.2")]
        );
        let key = orders.route_key();
        assert_eq!(key.route(), "orders");
        assert_eq!(key.options().kind_name(), "leastconnection");
        assert_eq!(key.options().sticky().map(|s| s.expiry_ms), Some(60000));

        let fallback = &config.routes[1];
        assert_eq!(fallback.path_prefix, "/");
        assert_eq!(fallback.scheme, "http");
        assert_eq!(fallback.load_balancer.kind, "");
    }

    #[test]
    fn test_same_config_same_key() {
        let a: GatewayConfig = toml::from_str(SAMPLE).unwrap();
        let b: GatewayConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(a.routes[0].route_key(), b.routes[0].route_key());
    }
}
