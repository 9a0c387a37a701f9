//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → ip_filter.rs   (perimeter allow/deny)
//!     → content.rs     (declared size, media type)
//!     → rate_limit.rs  (fixed-window counters per profile)
//!     → delay.rs       (progressive slowdown)
//!     → injection.rs   (operator keys, parameter pollution)
//!     → sanitize.rs    (markup stripping)
//!     → upload.rs      (file descriptors)
//!     → csrf.rs        (state-changing verbs)
//!     → audit.rs       (security-relevant request logging)
//!     → Pass to application handler
//! ```
//!
//! # Design Decisions
//! - Defense in depth: independent stages, each with one concern
//! - Fail closed: reject on any perimeter or content check failure
//! - Transform, don't trust: body/query reach handlers only sanitized

pub mod audit;
pub mod content;
pub mod csrf;
pub mod delay;
pub mod injection;
pub mod ip_filter;
pub mod rate_limit;
pub mod sanitize;
pub mod upload;

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::pipeline::Pipeline;
use rate_limit::WindowStore;

/// Assemble the full pipeline for a configuration.
///
/// The window store is injected so rebuilds on config reload keep the
/// in-flight counters.
pub fn build_pipeline(config: &GatewayConfig, store: Arc<dyn WindowStore>) -> Pipeline {
    let mut builder = Pipeline::builder()
        .stage(ip_filter::IpFilterStage::new(ip_filter::IpFilter::from_config(
            &config.ip_filter,
        )))
        .stage(content::BodySizeStage::new(config.request.max_body_bytes))
        .stage(content::ContentTypeStage::from_config(&config.request));

    if config.rate_limit.enabled {
        builder = builder.stage(rate_limit::RateLimitStage::from_config(
            &config.rate_limit,
            store.clone(),
        ));
    }
    if config.delay.enabled {
        builder = builder.stage(delay::DelayStage::new(delay::DelayGovernor::from_config(
            &config.delay,
            store,
        )));
    }

    builder = builder
        .stage(injection::InjectionGuardStage::new(
            config.sanitize.array_fields.clone(),
        ))
        .stage(sanitize::SanitizeStage)
        .stage(upload::UploadStage::new(upload::UploadValidator::from_config(
            &config.uploads,
        )));

    if config.csrf.enabled {
        builder = builder.stage(csrf::CsrfStage::from_config(&config.csrf));
    }

    builder
        .stage(audit::AuditStage::from_config(&config.audit))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::rate_limit::MemoryWindowStore;

    #[test]
    fn default_config_builds_the_full_chain() {
        let config = GatewayConfig::default();
        let pipeline = build_pipeline(&config, Arc::new(MemoryWindowStore::new()));
        assert_eq!(
            pipeline.stage_names(),
            vec![
                "ip_filter",
                "body_size",
                "content_type",
                "rate_limit",
                "delay",
                "injection_guard",
                "sanitize",
                "upload",
                "csrf",
                "audit",
            ]
        );
    }

    #[test]
    fn disabled_guards_are_omitted() {
        let mut config = GatewayConfig::default();
        config.rate_limit.enabled = false;
        config.delay.enabled = false;
        config.csrf.enabled = false;
        let pipeline = build_pipeline(&config, Arc::new(MemoryWindowStore::new()));
        assert!(!pipeline.stage_names().contains(&"rate_limit"));
        assert!(!pipeline.stage_names().contains(&"delay"));
        assert!(!pipeline.stage_names().contains(&"csrf"));
    }
}
