//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Route resolved → RouteKey + endpoint provider
//!     → house.rs (balancer per RouteKey, created on first access)
//!     → balancer.rs (lease: query current endpoints, apply strategy)
//!         - round_robin.rs (rotate through endpoints)
//!         - least_outstanding.rs (fewest unreleased leases)
//!         - no_balancing.rs (single target, pass-through)
//!     → lease.rs (handle carried by the request)
//!     → release back into the issuing balancer, exactly once
//! ```
//!
//! # Design Decisions
//! - Strategies are a closed enum, not trait objects
//! - Balancer state is per instance; no lock is shared between routes
//! - Expected failures (empty endpoint sets, unknown kinds) are `Result`s
//! - Release is tied to the lease's lifetime, so every exit path releases

pub mod balancer;
pub mod endpoint;
pub mod error;
pub mod house;
pub mod key;
pub mod lease;
pub mod least_outstanding;
pub mod no_balancing;
pub mod round_robin;

pub use balancer::{LoadBalancer, Strategy};
pub use endpoint::{Endpoint, EndpointSet};
pub use error::{CreationError, LoadBalancerError};
pub use house::LoadBalancerHouse;
pub use key::{BalancerKind, BalancerOptions, RouteKey, StickySessions};
pub use lease::Lease;
