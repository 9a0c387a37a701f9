//! CSRF token comparison for state-changing verbs.
//!
//! The gateway only compares tokens; issuing them and binding them to a
//! session is the identity provider's job.

use axum::http::StatusCode;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use rand::RngCore;

use crate::config::CsrfConfig;
use crate::pipeline::{ErrorCode, Rejection, RequestContext, Stage, StageOutcome};

/// A session-bound CSRF token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CsrfToken(String);

impl CsrfToken {
    /// Generate a fresh random token (32 bytes, hex-encoded).
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let mut encoded = String::with_capacity(64);
        for b in bytes {
            use std::fmt::Write;
            let _ = write!(encoded, "{b:02x}");
        }
        Self(encoded)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CsrfToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

pub struct CsrfStage {
    header_name: String,
    exempt_paths: Vec<String>,
}

impl CsrfStage {
    pub fn from_config(config: &CsrfConfig) -> Self {
        Self {
            header_name: config.header_name.clone(),
            exempt_paths: config.exempt_paths.clone(),
        }
    }

    fn supplied_token<'c>(&self, ctx: &'c RequestContext) -> Option<&'c str> {
        ctx.headers
            .get(self.header_name.as_str())
            .and_then(|v| v.to_str().ok())
    }
}

impl Stage for CsrfStage {
    fn name(&self) -> &'static str {
        "csrf"
    }

    fn apply<'a>(&'a self, ctx: RequestContext) -> BoxFuture<'a, StageOutcome> {
        async move {
            if !ctx.is_state_changing() || self.exempt_paths.iter().any(|p| p == &ctx.path) {
                return StageOutcome::Continue(ctx);
            }

            let expected = ctx
                .identity
                .as_ref()
                .and_then(|identity| identity.csrf_token.as_deref());
            let supplied = self.supplied_token(&ctx);

            match (expected, supplied) {
                (Some(expected), Some(supplied)) if expected == supplied => {
                    StageOutcome::Continue(ctx)
                }
                _ => {
                    tracing::warn!(
                        target: "audit",
                        client = %ctx.client_ip,
                        path = %ctx.path,
                        method = %ctx.method,
                        token_present = supplied.is_some(),
                        "CSRF check failed"
                    );
                    StageOutcome::Reject(Rejection::new(
                        StatusCode::FORBIDDEN,
                        ErrorCode::CsrfTokenInvalid,
                        "Invalid or missing CSRF token",
                    ))
                }
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::test_context;
    use crate::pipeline::{Identity, Role};
    use axum::http::{HeaderValue, Method};

    fn stage() -> CsrfStage {
        CsrfStage {
            header_name: "x-csrf-token".to_string(),
            exempt_paths: vec!["/api/user/login".to_string()],
        }
    }

    fn identity(token: &str) -> Identity {
        Identity {
            id: "u1".to_string(),
            role: Role::User,
            csrf_token: Some(token.to_string()),
        }
    }

    #[tokio::test]
    async fn get_without_token_passes() {
        let ctx = test_context();
        assert!(matches!(
            stage().apply(ctx).await,
            StageOutcome::Continue(_)
        ));
    }

    #[tokio::test]
    async fn post_without_token_is_rejected() {
        let mut ctx = test_context();
        ctx.method = Method::POST;
        ctx.identity = Some(identity("secret"));
        match stage().apply(ctx).await {
            StageOutcome::Reject(r) => {
                assert_eq!(r.status, StatusCode::FORBIDDEN);
                assert_eq!(r.code, ErrorCode::CsrfTokenInvalid);
            }
            StageOutcome::Continue(_) => panic!("POST without token must be rejected"),
        }
    }

    #[tokio::test]
    async fn post_with_matching_token_passes() {
        let mut ctx = test_context();
        ctx.method = Method::POST;
        ctx.identity = Some(identity("secret"));
        ctx.headers
            .insert("x-csrf-token", HeaderValue::from_static("secret"));
        assert!(matches!(
            stage().apply(ctx).await,
            StageOutcome::Continue(_)
        ));
    }

    #[tokio::test]
    async fn post_with_wrong_token_is_rejected() {
        let mut ctx = test_context();
        ctx.method = Method::POST;
        ctx.identity = Some(identity("secret"));
        ctx.headers
            .insert("x-csrf-token", HeaderValue::from_static("forged"));
        assert!(matches!(stage().apply(ctx).await, StageOutcome::Reject(_)));
    }

    #[tokio::test]
    async fn exempt_path_passes_without_token() {
        let mut ctx = test_context();
        ctx.method = Method::POST;
        ctx.path = "/api/user/login".to_string();
        assert!(matches!(
            stage().apply(ctx).await,
            StageOutcome::Continue(_)
        ));
    }

    #[tokio::test]
    async fn post_without_identity_is_rejected() {
        let mut ctx = test_context();
        ctx.method = Method::DELETE;
        ctx.headers
            .insert("x-csrf-token", HeaderValue::from_static("anything"));
        assert!(matches!(stage().apply(ctx).await, StageOutcome::Reject(_)));
    }

    #[test]
    fn generated_tokens_are_unique_hex() {
        let a = CsrfToken::generate();
        let b = CsrfToken::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
