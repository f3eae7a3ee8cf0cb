//! Downstream endpoint abstraction.
//!
//! # Responsibilities
//! - Represent a single downstream host and optional port
//! - Parse endpoints from `host`, `host:port` and `[v6]:port` notation
//!
//! # Design Decisions
//! - Port `0` means "no port": the request keeps whatever port it already had
//! - Value type, equality by host + port

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Snapshot of the endpoints currently eligible for a route.
pub type EndpointSet = Arc<Vec<Endpoint>>;

/// A downstream host and optional port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint. A port of `0` inherits the request's port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Create an endpoint without a port.
    pub fn host_only(host: impl Into<String>) -> Self {
        Self::new(host, 0)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port to apply downstream, `None` if the request's port should be kept.
    pub fn port(&self) -> Option<u16> {
        (self.port > 0).then_some(self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bracket = self.host.contains(':');
        match (self.port(), bracket) {
            (Some(port), true) => write!(f, "[{}]:{}", self.host, port),
            (Some(port), false) => write!(f, "{}:{}", self.host, port),
            (None, _) => f.write_str(&self.host),
        }
    }
}

/// Error returned when an endpoint string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointParseError {
    #[error("endpoint host is empty")]
    EmptyHost,
    #[error("invalid endpoint port `{0}`")]
    InvalidPort(String),
    #[error("unterminated IPv6 literal in `{0}`")]
    UnterminatedBracket(String),
}

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| EndpointParseError::UnterminatedBracket(s.to_string()))?;
            match tail.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if tail.is_empty() => (host, None),
                None => return Err(EndpointParseError::InvalidPort(tail.to_string())),
            }
        } else {
            match s.rsplit_once(':') {
                // A bare IPv6 address has several colons and no port.
                Some((host, _)) if host.contains(':') => (s, None),
                Some((host, port)) => (host, Some(port)),
                None => (s, None),
            }
        };

        if host.is_empty() {
            return Err(EndpointParseError::EmptyHost);
        }

        let port = match port {
            Some(p) => p
                .parse::<u16>()
                .map_err(|_| EndpointParseError::InvalidPort(p.to_string()))?,
            None => 0,
        };

        Ok(Endpoint::new(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_and_port() {
        let ep: Endpoint = "10.0.0.1:8080".parse().unwrap();
        assert_eq!(ep.host(), "10.0.0.1");
        assert_eq!(ep.port(), Some(8080));
        assert_eq!(ep.to_string(), "10.0.0.1:8080");
    }

    #[test]
    fn test_zero_port_is_inherited() {
        let ep: Endpoint = "h3:0".parse().unwrap();
        assert_eq!(ep.host(), "h3");
        assert_eq!(ep.port(), None);
        assert_eq!(ep, Endpoint::host_only("h3"));
        assert_eq!(ep.to_string(), "h3");
    }

    #[test]
    fn test_parse_ipv6() {
        let ep: Endpoint = "[::1]:9000".parse().unwrap();
        assert_eq!(ep.host(), "::1");
        assert_eq!(ep.port(), Some(9000));
        assert_eq!(ep.to_string(), "[::1]:9000");

        let bare: Endpoint = "fe80::1".parse().unwrap();
        assert_eq!(bare.host(), "fe80::1");
        assert_eq!(bare.port(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Endpoint>(), Err(EndpointParseError::EmptyHost));
        assert_eq!(":80".parse::<Endpoint>(), Err(EndpointParseError::EmptyHost));
        assert!(matches!(
            "host:http".parse::<Endpoint>(),
            Err(EndpointParseError::InvalidPort(_))
        ));
        assert!(matches!(
            "[::1:80".parse::<Endpoint>(),
            Err(EndpointParseError::UnterminatedBracket(_))
        ));
    }
}
