//! Request context and rejection types shared by all pipeline stages.
//!
//! # Responsibilities
//! - Carry the security-relevant view of a request (method, path, headers,
//!   client IP, parsed body/query, upload descriptors, identity)
//! - Define the uniform rejection shape returned by any stage
//!
//! # Design Decisions
//! - The context is an owned value passed stage to stage; sanitizing stages
//!   return a new context instead of mutating shared request state
//! - Rejections carry their HTTP status and machine-readable error code so
//!   every stage produces a complete, well-formed error response

use axum::{
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use std::net::IpAddr;

/// Authenticated identity attached by an upstream auth stage.
///
/// The gateway never produces this itself; the CSRF guard and the audit
/// stage read it when present.
#[derive(Clone, Debug)]
pub struct Identity {
    pub id: String,
    pub role: Role,
    pub csrf_token: Option<String>,
}

/// Role of the authenticated identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
}

/// Descriptor for a file attached to a multipart request.
///
/// Only the metadata needed for validation is carried; file contents are
/// buffered by the server adapter and never inspected here.
#[derive(Clone, Debug)]
pub struct FileUpload {
    pub filename: String,
    pub content_type: String,
    pub size: u64,
}

/// The security-relevant view of an in-flight request.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub client_ip: IpAddr,
    /// Declared `Content-Length`, if the client sent one.
    pub content_length: Option<u64>,
    /// Query string parsed into an object. Repeated keys are preserved as
    /// arrays until the parameter-pollution stage resolves them.
    pub query: Value,
    /// Parsed JSON body, when the request carried one.
    pub body: Option<Value>,
    /// Route parameters, when the embedding router provides them.
    pub params: Value,
    pub files: Vec<FileUpload>,
    pub identity: Option<Identity>,
    pub request_id: String,
}

impl RequestContext {
    /// Media type of the request body, without parameters (`; charset=...`).
    pub fn media_type(&self) -> Option<&str> {
        self.headers
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim())
    }

    /// Whether the verb can change server state (everything except
    /// GET/HEAD/OPTIONS).
    pub fn is_state_changing(&self) -> bool {
        !matches!(self.method, Method::GET | Method::HEAD | Method::OPTIONS)
    }
}

/// Machine-readable error codes emitted by rejecting stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    RateLimitExceeded,
    PayloadTooLarge,
    UnsupportedMediaType,
    CsrfTokenInvalid,
    InvalidFileType,
    FileTooLarge,
    InvalidFileName,
    IpBlacklisted,
    IpNotWhitelisted,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::UnsupportedMediaType => "UNSUPPORTED_MEDIA_TYPE",
            ErrorCode::CsrfTokenInvalid => "CSRF_TOKEN_INVALID",
            ErrorCode::InvalidFileType => "INVALID_FILE_TYPE",
            ErrorCode::FileTooLarge => "FILE_TOO_LARGE",
            ErrorCode::InvalidFileName => "INVALID_FILE_NAME",
            ErrorCode::IpBlacklisted => "IP_BLACKLISTED",
            ErrorCode::IpNotWhitelisted => "IP_NOT_WHITELISTED",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A terminal rejection produced by a stage.
///
/// Every rejection is final for the request; no stage retries.
#[derive(Debug)]
pub struct Rejection {
    pub status: StatusCode,
    pub code: ErrorCode,
    pub message: String,
    /// Extra response headers, e.g. `Retry-After` from the rate limiter.
    pub headers: Vec<(HeaderName, HeaderValue)>,
}

impl Rejection {
    pub fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }
}

#[derive(Serialize)]
struct RejectionBody<'a> {
    success: bool,
    message: &'a str,
    error: &'static str,
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let body = Json(RejectionBody {
            success: false,
            message: &self.message,
            error: self.code.as_str(),
        });
        let mut response = (self.status, body).into_response();
        for (name, value) in self.headers {
            response.headers_mut().insert(name, value);
        }
        response
    }
}

/// Blank context for unit tests.
#[cfg(test)]
pub(crate) fn test_context() -> RequestContext {
    RequestContext {
        method: Method::GET,
        path: "/".to_string(),
        headers: HeaderMap::new(),
        client_ip: "127.0.0.1".parse().unwrap(),
        content_length: None,
        query: Value::Object(serde_json::Map::new()),
        body: None,
        params: Value::Object(serde_json::Map::new()),
        files: Vec::new(),
        identity: None,
        request_id: "test".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_upper_snake() {
        let codes = [
            ErrorCode::RateLimitExceeded,
            ErrorCode::PayloadTooLarge,
            ErrorCode::UnsupportedMediaType,
            ErrorCode::CsrfTokenInvalid,
            ErrorCode::InvalidFileType,
            ErrorCode::FileTooLarge,
            ErrorCode::InvalidFileName,
            ErrorCode::IpBlacklisted,
            ErrorCode::IpNotWhitelisted,
        ];
        for code in codes {
            assert!(code
                .as_str()
                .chars()
                .all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }

    #[test]
    fn state_changing_verbs() {
        let mut ctx = test_context();
        for method in [Method::GET, Method::HEAD, Method::OPTIONS] {
            ctx.method = method;
            assert!(!ctx.is_state_changing());
        }
        for method in [Method::POST, Method::PUT, Method::PATCH, Method::DELETE] {
            ctx.method = method;
            assert!(ctx.is_state_changing());
        }
    }
}
