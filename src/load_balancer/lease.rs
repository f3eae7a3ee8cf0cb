//! Lease handles.
//!
//! # Responsibilities
//! - Carry the selected endpoint for one request
//! - Return the selection to the balancer that issued it, exactly once
//!
//! # Design Decisions
//! - `Lease::release` consumes the handle, so the ordinary path cannot release twice
//! - Dropping an unreleased lease releases it (panic unwinding, cancelled futures)
//! - The handle keeps its balancer alive, so releasing after eviction is safe

use std::fmt;
use std::sync::Arc;
use crate::load_balancer::balancer::LoadBalancer;
use crate::load_balancer::endpoint::Endpoint;

/// An endpoint selection reserved for one request.
pub struct Lease {
    balancer: Arc<LoadBalancer>,
    endpoint: Endpoint,
    /// One-shot marker, cleared by the first release.
    armed: bool,
}

impl Lease {
    pub(crate) fn new(balancer: Arc<LoadBalancer>, endpoint: Endpoint) -> Self {
        Self {
            balancer,
            endpoint,
            armed: true,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The balancer this lease belongs to.
    pub fn balancer(&self) -> &Arc<LoadBalancer> {
        &self.balancer
    }

    /// True until the lease has been released.
    pub fn is_active(&self) -> bool {
        self.armed
    }

    /// Clear the one-shot marker. Returns false if it was already cleared.
    pub(crate) fn disarm(&mut self) -> bool {
        std::mem::replace(&mut self.armed, false)
    }

    /// Return the endpoint to the issuing balancer.
    pub fn release(mut self) {
        let balancer = self.balancer.clone();
        balancer.release(&mut self);
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("route", &self.balancer.key().route())
            .field("endpoint", &self.endpoint)
            .field("armed", &self.armed)
            .finish()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(
                route = %self.balancer.key().route(),
                endpoint = %self.endpoint,
                "Lease dropped without explicit release, releasing"
            );
            let balancer = self.balancer.clone();
            balancer.release(self);
        }
    }
}
