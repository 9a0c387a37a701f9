//! Content-type and request-size gates.
//!
//! # Responsibilities
//! - Require an allow-listed media type on any non-GET request
//! - Reject requests whose declared length exceeds the body ceiling,
//!   before the body is read
//!
//! # Design Decisions
//! - GET bypasses the media-type check entirely
//! - Only the declared `Content-Length` is consulted here; the server
//!   adapter additionally caps the actual read

use axum::http::{Method, StatusCode};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::config::RequestConfig;
use crate::pipeline::{ErrorCode, Rejection, RequestContext, Stage, StageOutcome};

/// Gate rejecting oversized declared bodies.
pub struct BodySizeStage {
    max_bytes: u64,
}

impl BodySizeStage {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

impl Stage for BodySizeStage {
    fn name(&self) -> &'static str {
        "body_size"
    }

    fn apply<'a>(&'a self, ctx: RequestContext) -> BoxFuture<'a, StageOutcome> {
        async move {
            if let Some(declared) = ctx.content_length {
                if declared > self.max_bytes {
                    tracing::warn!(
                        client = %ctx.client_ip,
                        declared,
                        limit = self.max_bytes,
                        "Declared body exceeds limit"
                    );
                    return StageOutcome::Reject(Rejection::new(
                        StatusCode::PAYLOAD_TOO_LARGE,
                        ErrorCode::PayloadTooLarge,
                        format!("Request body exceeds {} bytes", self.max_bytes),
                    ));
                }
            }
            StageOutcome::Continue(ctx)
        }
        .boxed()
    }
}

/// Gate requiring an allow-listed media type on non-GET requests.
pub struct ContentTypeStage {
    allowed: Vec<String>,
}

impl ContentTypeStage {
    pub fn from_config(config: &RequestConfig) -> Self {
        Self {
            allowed: config.allowed_content_types.clone(),
        }
    }

    fn is_allowed(&self, media_type: &str) -> bool {
        self.allowed
            .iter()
            .any(|allowed| media_type.eq_ignore_ascii_case(allowed))
    }
}

impl Stage for ContentTypeStage {
    fn name(&self) -> &'static str {
        "content_type"
    }

    fn apply<'a>(&'a self, ctx: RequestContext) -> BoxFuture<'a, StageOutcome> {
        async move {
            if ctx.method == Method::GET {
                return StageOutcome::Continue(ctx);
            }
            match ctx.media_type() {
                Some(media_type) if self.is_allowed(media_type) => StageOutcome::Continue(ctx),
                other => {
                    tracing::warn!(
                        client = %ctx.client_ip,
                        content_type = other.unwrap_or("<missing>"),
                        path = %ctx.path,
                        "Unsupported media type"
                    );
                    StageOutcome::Reject(Rejection::new(
                        StatusCode::UNSUPPORTED_MEDIA_TYPE,
                        ErrorCode::UnsupportedMediaType,
                        "Content-Type not allowed",
                    ))
                }
            }
        }
        .boxed()
    }
}
