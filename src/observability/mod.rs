//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All stages produce:
//!     → logging.rs (structured log events, "audit" target for security)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, file, remote)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Audit events are emitted, never persisted or queried here
//! - Metrics are cheap (atomic increments)
//! - Request ID flows through all events for correlation

pub mod logging;
pub mod metrics;
