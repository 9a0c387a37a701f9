//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows > 0, sizes > 0)
//! - Check IP list entries parse as addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: GatewayConfig -> Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

use crate::config::schema::GatewayConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid bind address '{0}'")]
    InvalidBindAddress(String),

    #[error("invalid metrics address '{0}'")]
    InvalidMetricsAddress(String),

    #[error("rate limit profile '{profile}' has a zero-length window")]
    ZeroWindow { profile: &'static str },

    #[error("rate limit profile '{profile}' allows zero requests")]
    ZeroMax { profile: &'static str },

    #[error("request.max_body_bytes must be greater than zero")]
    ZeroBodyLimit,

    #[error("uploads.max_file_bytes must be greater than zero")]
    ZeroFileLimit,

    #[error("request.allowed_content_types must not be empty")]
    EmptyContentTypes,

    #[error("uploads.allowed_types must not be empty")]
    EmptyUploadTypes,

    #[error("ip_filter.{list} entry '{value}' is not a valid IP address")]
    InvalidIpEntry { list: &'static str, value: String },

    #[error("delay.max_delay_ms must be at least delay.delay_ms")]
    DelayCapBelowStep,

    #[error("csrf.header_name must not be empty")]
    EmptyCsrfHeader,

    #[error("admin API is enabled with the placeholder api_key")]
    PlaceholderAdminKey,
}

/// Validate a configuration, collecting every violation.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    for (name, profile) in [
        ("auth", &config.rate_limit.auth),
        ("api", &config.rate_limit.api),
        ("payment", &config.rate_limit.payment),
    ] {
        if profile.window_secs == 0 {
            errors.push(ValidationError::ZeroWindow { profile: name });
        }
        if profile.max == 0 {
            errors.push(ValidationError::ZeroMax { profile: name });
        }
    }

    if config.request.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }
    if config.uploads.max_file_bytes == 0 {
        errors.push(ValidationError::ZeroFileLimit);
    }
    if config.request.allowed_content_types.is_empty() {
        errors.push(ValidationError::EmptyContentTypes);
    }
    if config.uploads.allowed_types.is_empty() {
        errors.push(ValidationError::EmptyUploadTypes);
    }

    for (list, entries) in [
        ("allow", &config.ip_filter.allow),
        ("deny", &config.ip_filter.deny),
    ] {
        for entry in entries {
            if entry.parse::<IpAddr>().is_err() {
                errors.push(ValidationError::InvalidIpEntry {
                    list,
                    value: entry.clone(),
                });
            }
        }
    }

    if config.delay.enabled && config.delay.max_delay_ms < config.delay.delay_ms {
        errors.push(ValidationError::DelayCapBelowStep);
    }

    if config.csrf.enabled && config.csrf.header_name.is_empty() {
        errors.push(ValidationError::EmptyCsrfHeader);
    }

    if config.admin.enabled && config.admin.api_key == "CHANGE_ME_IN_PRODUCTION" {
        errors.push(ValidationError::PlaceholderAdminKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn bad_ip_entry_is_reported() {
        let mut config = GatewayConfig::default();
        config.ip_filter.deny.push("not-an-ip".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidIpEntry {
            list: "deny",
            value: "not-an-ip".to_string(),
        }));
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "nope".to_string();
        config.rate_limit.auth.window_secs = 0;
        config.rate_limit.payment.max = 0;
        config.request.allowed_content_types.clear();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn enabled_admin_rejects_placeholder_key() {
        let mut config = GatewayConfig::default();
        config.admin.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::PlaceholderAdminKey));
    }

    #[test]
    fn delay_cap_must_cover_one_step() {
        let mut config = GatewayConfig::default();
        config.delay.delay_ms = 1_000;
        config.delay.max_delay_ms = 500;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::DelayCapBelowStep));
    }
}
