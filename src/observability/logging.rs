//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Respect `RUST_LOG` when set, falling back to the configured level
//!
//! # Design Decisions
//! - Uses the tracing crate for structured logging
//! - Audit events use the dedicated "audit" target so a subscriber can
//!   route them to their own sink

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise the configured level applies to
/// the gateway and the audit target.
pub fn init(log_level: &str) {
    let fallback = format!("security_gateway={log_level},audit={log_level},tower_http=warn");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
