//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, route lookup, status mapping)
//!     → pipeline (lease an endpoint, rewrite target)
//!     → forward.rs (send to endpoint, collect response)
//!     → Send to client
//! ```

pub mod forward;
pub mod server;

pub use forward::{ForwardStage, HttpExchange, X_REQUEST_ID};
pub use server::HttpServer;
