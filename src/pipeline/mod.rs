//! Request pipeline.
//!
//! # Data Flow
//! ```text
//! DownstreamContext (route resolved, target unset)
//!     → load_balancing.rs
//!         house.get(key) ─ err → ResolutionFailed, error recorded, stop
//!         balancer.lease() ─ err → LeaseFailed, error recorded, stop
//!         target ← leased endpoint
//!         next stage (forwarding)
//!         release (always, including unwind and cancellation)
//! ```
//!
//! # Design Decisions
//! - Stages form a chain; each owns the next one
//! - Expected failures go to the context's error channel, never panic
//! - Panics from later stages propagate untouched, after cleanup

pub mod context;
pub mod load_balancing;

use futures_util::future::BoxFuture;
use crate::load_balancer::LoadBalancerError;

pub use context::{BalancingState, DownstreamContext, DownstreamRoute, DownstreamTarget};
pub use load_balancing::LoadBalancingStage;

/// One step of the request pipeline.
pub trait Stage<X>: Send + Sync {
    fn invoke<'a>(&'a self, ctx: &'a mut DownstreamContext<X>) -> BoxFuture<'a, ()>;
}

/// Coarse classification used by the transport layer to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Nothing to route to right now; worth retrying later.
    ServiceUnavailable,
    Misconfigured,
    BadGateway,
    GatewayTimeout,
}

/// Errors recorded on the context's error channel.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    LoadBalancer(#[from] LoadBalancerError),

    #[error("invalid downstream target: {0}")]
    InvalidTarget(String),

    #[error("downstream request failed: {0}")]
    Downstream(String),

    #[error("downstream request timed out")]
    DownstreamTimeout,
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PipelineError::LoadBalancer(e) if e.is_unavailable() => ErrorClass::ServiceUnavailable,
            PipelineError::LoadBalancer(_) => ErrorClass::Misconfigured,
            PipelineError::InvalidTarget(_) => ErrorClass::Misconfigured,
            PipelineError::Downstream(_) => ErrorClass::BadGateway,
            PipelineError::DownstreamTimeout => ErrorClass::GatewayTimeout,
        }
    }
}
