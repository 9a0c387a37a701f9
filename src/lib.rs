//! Security Gateway Library
//!
//! An ordered chain of request-security stages (perimeter, throughput,
//! input hardening, audit) that runs in front of any Axum application.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod security;

pub use config::schema::GatewayConfig;
pub use http::{GatewayServer, SanitizedRequest};
pub use lifecycle::Shutdown;
pub use pipeline::{Identity, Role};
