//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware layers)
//!     → request.rs (request ID)
//!     → [security pipeline runs as middleware]
//!     → application handler (receives SanitizedRequest)
//!     → response (hardening headers, anomaly logging)
//! ```

pub mod request;
pub mod server;
pub mod tls;

pub use request::{RequestId, RequestIdExt, RequestIdLayer, X_REQUEST_ID};
pub use server::{AppState, GatewayServer, IdentityResolver, SanitizedRequest};
