//! Registry keys and balancing options.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// The closed set of balancing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BalancerKind {
    RoundRobin,
    LeastOutstanding,
    NoBalancing,
}

impl BalancerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalancerKind::RoundRobin => "round_robin",
            BalancerKind::LeastOutstanding => "least_outstanding",
            BalancerKind::NoBalancing => "no_balancing",
        }
    }
}

impl fmt::Display for BalancerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised balancer kind name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown load balancer kind `{0}`")]
pub struct UnknownKind(pub String);

impl FromStr for BalancerKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_kind(s).as_str() {
            "roundrobin" => Ok(BalancerKind::RoundRobin),
            "leastoutstanding" | "leastconnection" => Ok(BalancerKind::LeastOutstanding),
            "" | "nobalancing" | "noloadbalancer" => Ok(BalancerKind::NoBalancing),
            _ => Err(UnknownKind(s.to_string())),
        }
    }
}

/// Lowercase, with `_`, `-` and whitespace removed.
fn normalize_kind(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '_' | '-') && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Cookie based session affinity settings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StickySessions {
    pub key: String,
    pub expiry_ms: u64,
}

/// The balancing configuration in effect for a route.
///
/// The kind is kept as configured text so that a misconfigured route still
/// yields a key; the house reports the unknown kind when it tries to build
/// the balancer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BalancerOptions {
    kind: String,
    sticky: Option<StickySessions>,
}

impl BalancerOptions {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: normalize_kind(kind),
            sticky: None,
        }
    }

    pub fn with_sticky(mut self, sticky: StickySessions) -> Self {
        self.sticky = Some(sticky);
        self
    }

    /// Normalized kind name.
    pub fn kind_name(&self) -> &str {
        &self.kind
    }

    pub fn kind(&self) -> Result<BalancerKind, UnknownKind> {
        self.kind.parse()
    }

    pub fn sticky(&self) -> Option<&StickySessions> {
        self.sticky.as_ref()
    }
}

/// Identity of a downstream route under one balancing configuration.
///
/// Immutable and cheap to clone. Equal keys share one balancer in the house.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    route: Arc<str>,
    options: BalancerOptions,
}

impl RouteKey {
    pub fn new(route: impl Into<Arc<str>>, options: BalancerOptions) -> Self {
        Self {
            route: route.into(),
            options,
        }
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn options(&self) -> &BalancerOptions {
        &self.options
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.route, self.options.kind)?;
        if let Some(sticky) = &self.options.sticky {
            write!(f, "|sticky:{}", sticky.key)?;
        }
        Ok(())
    }
}
