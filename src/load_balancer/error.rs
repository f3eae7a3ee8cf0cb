//! Load balancer error taxonomy.

use crate::load_balancer::key::UnknownKind;

/// Failure to build a balancer for a route key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CreationError {
    #[error(transparent)]
    UnknownKind(#[from] UnknownKind),

    #[error("route `{route}` has no endpoints to balance over")]
    EmptyEndpointSet { route: String },
}

/// Errors produced by the house, the strategies and lease bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadBalancerError {
    #[error("unable to create load balancer for route `{route}`: {source}")]
    Creation {
        route: String,
        #[source]
        source: CreationError,
    },

    #[error("no endpoints available for route `{route}`")]
    NoEndpointsAvailable { route: String },

    #[error("lease on `{endpoint}` for route `{route}` was already released")]
    DoubleRelease { route: String, endpoint: String },
}

impl LoadBalancerError {
    /// True for transient unavailability (empty endpoint sets), as opposed to
    /// misconfiguration.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            LoadBalancerError::NoEndpointsAvailable { .. }
                | LoadBalancerError::Creation {
                    source: CreationError::EmptyEndpointSet { .. },
                    ..
                }
        )
    }
}
