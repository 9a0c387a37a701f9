//! Request identification.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) as early as possible
//! - Preserve an ID supplied by a trusted upstream proxy
//! - Expose the ID to handlers and audit events via an extension
//!
//! # Design Decisions
//! - Implemented as a plain tower layer so it sits in front of every
//!   route, including admin and health

use axum::http::{HeaderValue, Request};
use tower::{Layer, Service};
use uuid::Uuid;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Request extension holding the assigned ID.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Accessor for the request ID on a request.
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&str>;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<&str> {
        self.extensions().get::<RequestId>().map(|id| id.as_str())
    }
}

/// Layer attaching a request ID header and extension.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService { inner }
    }
}

#[derive(Clone, Debug)]
pub struct RequestIdService<S> {
    inner: S,
}

impl<S, B> Service<Request<B>> for RequestIdService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let id = req
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Ok(value) = HeaderValue::from_str(&id) {
            req.headers_mut().insert(X_REQUEST_ID, value);
        }
        req.extensions_mut().insert(RequestId(id));

        self.inner.call(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::convert::Infallible;
    use tower::{service_fn, ServiceExt};

    #[tokio::test]
    async fn assigns_an_id_when_missing() {
        let service = RequestIdLayer.layer(service_fn(|req: Request<Body>| async move {
            Ok::<_, Infallible>(req.request_id().unwrap().to_string())
        }));
        let id = service
            .oneshot(Request::new(Body::empty()))
            .await
            .unwrap();
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[tokio::test]
    async fn preserves_an_upstream_id() {
        let service = RequestIdLayer.layer(service_fn(|req: Request<Body>| async move {
            Ok::<_, Infallible>(req.request_id().unwrap().to_string())
        }));
        let req = Request::builder()
            .header(X_REQUEST_ID, "upstream-42")
            .body(Body::empty())
            .unwrap();
        let id = service.oneshot(req).await.unwrap();
        assert_eq!(id, "upstream-42");
    }
}
