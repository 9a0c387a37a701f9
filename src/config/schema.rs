//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! gateway. All types derive Serde traits for deserialization from config
//! files.

use serde::{Deserialize, Serialize};

/// Root configuration for the security gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Request body and media-type limits.
    pub request: RequestConfig,

    /// File upload limits.
    pub uploads: UploadConfig,

    /// Rate limiting profiles.
    pub rate_limit: RateLimitConfig,

    /// Progressive delay governor.
    pub delay: DelayConfig,

    /// IP allow/deny lists.
    pub ip_filter: IpFilterConfig,

    /// CSRF protection.
    pub csrf: CsrfConfig,

    /// Sanitizer settings.
    pub sanitize: SanitizeConfig,

    /// Audit path classification.
    pub audit: AuditConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Attach hardening headers to every response.
    pub security_headers: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            request_timeout_secs: 30,
            security_headers: true,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Request-level limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Maximum request body size in bytes.
    pub max_body_bytes: u64,

    /// Media types accepted on non-GET requests.
    pub allowed_content_types: Vec<String>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 10 * 1024 * 1024,
            allowed_content_types: vec![
                "application/json".to_string(),
                "multipart/form-data".to_string(),
            ],
        }
    }
}

/// Upload limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum size per file in bytes.
    pub max_file_bytes: u64,

    /// MIME types accepted for uploads.
    pub allowed_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 5 * 1024 * 1024,
            allowed_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/gif".to_string(),
                "image/webp".to_string(),
            ],
        }
    }
}

/// Parameters for one rate-limit profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitProfile {
    /// Window length in seconds.
    pub window_secs: u64,

    /// Maximum requests per window per client.
    pub max: u64,

    /// Message returned on rejection.
    #[serde(default = "default_limit_message")]
    pub message: String,
}

fn default_limit_message() -> String {
    "Too many requests, please try again later".to_string()
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Narrow profile for login/registration endpoints.
    pub auth: RateLimitProfile,

    /// General API profile.
    pub api: RateLimitProfile,

    /// Payment profile.
    pub payment: RateLimitProfile,

    /// Exact paths limited by the auth profile.
    pub auth_paths: Vec<String>,

    /// Path prefixes limited by the payment profile.
    pub payment_path_prefixes: Vec<String>,

    /// Paths that skip counting entirely.
    pub bypass_paths: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auth: RateLimitProfile {
                window_secs: 15 * 60,
                max: 5,
                message: "Too many authentication attempts, please try again later".to_string(),
            },
            api: RateLimitProfile {
                window_secs: 15 * 60,
                max: 100,
                message: default_limit_message(),
            },
            payment: RateLimitProfile {
                window_secs: 60,
                max: 3,
                message: "Too many payment attempts, please try again later".to_string(),
            },
            auth_paths: vec![
                "/api/user/login".to_string(),
                "/api/user/register".to_string(),
            ],
            payment_path_prefixes: vec!["/api/payment".to_string()],
            bypass_paths: vec!["/health".to_string()],
        }
    }
}

/// Progressive delay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DelayConfig {
    /// Enable the delay governor.
    pub enabled: bool,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Requests per window before delays start.
    pub threshold: u64,

    /// Delay step per request over the threshold, in milliseconds.
    pub delay_ms: u64,

    /// Maximum delay per request, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 15 * 60,
            threshold: 50,
            delay_ms: 500,
            max_delay_ms: 20_000,
        }
    }
}

/// IP filter configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct IpFilterConfig {
    /// Clients always admitted; empty means no restriction.
    pub allow: Vec<String>,

    /// Clients always blocked; checked before the allow list.
    pub deny: Vec<String>,
}

/// CSRF configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Enable CSRF checking.
    pub enabled: bool,

    /// Header carrying the client's token.
    pub header_name: String,

    /// State-changing paths exempt from the check. Login and registration
    /// precede a session, so no session-bound token can exist for them.
    pub exempt_paths: Vec<String>,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            header_name: "x-csrf-token".to_string(),
            exempt_paths: vec![
                "/api/user/login".to_string(),
                "/api/user/register".to_string(),
            ],
        }
    }
}

/// Sanitizer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SanitizeConfig {
    /// Query fields that are intentionally array-valued (multi-select
    /// filters); repeated values for these are preserved.
    pub array_fields: Vec<String>,
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            array_fields: vec![
                "tags".to_string(),
                "categories".to_string(),
                "sizes".to_string(),
                "colors".to_string(),
            ],
        }
    }
}

/// Audit path classification.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Paths logged as authentication attempts.
    pub auth_path_prefixes: Vec<String>,

    /// Paths logged as admin-privileged actions.
    pub admin_path_prefixes: Vec<String>,

    /// Paths logged as payment/order actions.
    pub payment_path_prefixes: Vec<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            auth_path_prefixes: vec![
                "/api/user/login".to_string(),
                "/api/user/register".to_string(),
            ],
            admin_path_prefixes: vec!["/api/admin".to_string()],
            payment_path_prefixes: vec![
                "/api/payment".to_string(),
                "/api/order".to_string(),
            ],
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}
