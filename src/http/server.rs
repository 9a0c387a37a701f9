//! HTTP server setup and the pipeline adapter.
//!
//! # Responsibilities
//! - Create the Axum router wrapping the application routes
//! - Adapt each request into a `RequestContext`, run the pipeline, and
//!   substitute the sanitized result before the handler sees it
//! - Wire up middleware (tracing, timeout, request ID, response headers)
//! - Post-response observation (metrics, anomaly logging)
//! - Apply configuration reloads atomically
//!
//! # Design Decisions
//! - `/health` and the admin API mount outside the pipeline
//! - The pipeline and config live behind an atomic swap; reloads rebuild
//!   the pipeline but keep the window store, so counters survive
//! - A rejected request is answered entirely here; nothing reaches the
//!   application handler

use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, FromRequest, Multipart, State},
    http::{header, uri::Uri, HeaderMap, HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use arc_swap::ArcSwap;
use serde_json::{Map, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    set_header::SetResponseHeaderLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::admin;
use crate::config::GatewayConfig;
use crate::http::request::{RequestIdExt, RequestIdLayer};
use crate::observability::metrics;
use crate::pipeline::{ErrorCode, FileUpload, Identity, Pipeline, Rejection, RequestContext};
use crate::security::audit;
use crate::security::rate_limit::{MemoryWindowStore, WindowStore};

/// Resolver mapping request headers to an authenticated identity.
///
/// Stands in for the upstream auth stage when the gateway runs
/// standalone; an embedding application normally attaches `Identity` as a
/// request extension instead.
pub type IdentityResolver = Arc<dyn Fn(&HeaderMap) -> Option<Identity> + Send + Sync>;

/// Swappable per-configuration state.
pub struct GatewayInner {
    pub config: GatewayConfig,
    pub pipeline: Pipeline,
    pub window_store: Arc<MemoryWindowStore>,
    pub identity_resolver: Option<IdentityResolver>,
    pub started_at: Instant,
    pub request_count: AtomicUsize,
}

/// Application state injected into middleware and admin handlers.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<ArcSwap<GatewayInner>>,
}

impl AppState {
    fn new(config: GatewayConfig, identity_resolver: Option<IdentityResolver>) -> Self {
        let window_store = Arc::new(MemoryWindowStore::new());
        let pipeline =
            crate::security::build_pipeline(&config, window_store.clone() as Arc<dyn WindowStore>);
        let inner = GatewayInner {
            config,
            pipeline,
            window_store,
            identity_resolver,
            started_at: Instant::now(),
            request_count: AtomicUsize::new(0),
        };
        Self {
            inner: Arc::new(ArcSwap::from_pointee(inner)),
        }
    }

    /// Swap in a new configuration, rebuilding the pipeline.
    ///
    /// The window store carries over so in-flight rate windows survive a
    /// reload.
    pub fn apply_config(&self, config: GatewayConfig) {
        let current = self.inner.load();
        let window_store = current.window_store.clone();
        let pipeline = crate::security::build_pipeline(
            &config,
            window_store.clone() as Arc<dyn WindowStore>,
        );
        let next = GatewayInner {
            config,
            pipeline,
            window_store,
            identity_resolver: current.identity_resolver.clone(),
            started_at: current.started_at,
            request_count: AtomicUsize::new(current.request_count.load(Ordering::Relaxed)),
        };
        self.inner.store(Arc::new(next));
        tracing::info!("Configuration reloaded");
    }
}

/// Sanitized request data attached for application handlers.
#[derive(Clone, Debug)]
pub struct SanitizedRequest {
    pub body: Option<Value>,
    pub query: Value,
    pub params: Value,
}

/// HTTP server for the security gateway.
pub struct GatewayServer {
    router: Router,
    config: GatewayConfig,
    state: AppState,
}

impl GatewayServer {
    /// Create a new server guarding the given application router.
    pub fn new(config: GatewayConfig, app: Router) -> Self {
        Self::with_identity_resolver(config, app, None)
    }

    /// Create a server with an identity resolver for standalone use.
    pub fn with_identity_resolver(
        config: GatewayConfig,
        app: Router,
        identity_resolver: Option<IdentityResolver>,
    ) -> Self {
        let state = AppState::new(config.clone(), identity_resolver);
        let router = Self::build_router(&config, state.clone(), app);
        Self {
            router,
            config,
            state,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: AppState, app: Router) -> Router {
        let guarded = app.layer(middleware::from_fn_with_state(
            state.clone(),
            security_middleware,
        ));

        let mut router = Router::new().route("/health", get(health_handler));
        if config.admin.enabled {
            router = router.merge(admin::admin_router(state.clone()));
        }
        let mut router = router
            .merge(guarded)
            .layer(middleware::from_fn_with_state(state, observe_middleware))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.listener.request_timeout_secs,
            )))
            .layer(RequestIdLayer)
            .layer(TraceLayer::new_for_http());

        if config.listener.security_headers {
            router = router
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static("DENY"),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::REFERRER_POLICY,
                    HeaderValue::from_static("strict-origin-when-cross-origin"),
                ));
        }

        router
    }

    /// Run the server until shutdown, applying config updates as they
    /// arrive.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway starting");

        let reload_state = self.state.clone();
        tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                reload_state.apply_config(new_config);
            }
        });

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        if let Some(tls) = &self.config.listener.tls {
            let rustls_config = crate::http::tls::load_tls_config(
                std::path::Path::new(&tls.cert_path),
                std::path::Path::new(&tls.key_path),
            )
            .await?;

            let handle = axum_server::Handle::new();
            let shutdown_handle = handle.clone();
            tokio::spawn(async move {
                let _ = shutdown.recv().await;
                shutdown_handle.graceful_shutdown(Some(Duration::from_secs(10)));
            });

            axum_server::from_tcp_rustls(listener.into_std()?, rustls_config)
                .handle(handle)
                .serve(app)
                .await?;
        } else {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown.recv().await;
                })
                .await?;
        }

        tracing::info!("Gateway stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Get a handle to the server state (admin, tests).
    pub fn state(&self) -> AppState {
        self.state.clone()
    }
}

async fn health_handler() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Outer middleware: request counting, metrics, anomaly logging.
async fn observe_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request.request_id().unwrap_or("unknown").to_string();

    state
        .inner
        .load()
        .request_count
        .fetch_add(1, Ordering::Relaxed);

    let response = next.run(request).await;

    let status = response.status().as_u16();
    metrics::record_request(method.as_str(), status, start);
    audit::record_anomaly(addr.ip(), &method, &path, status, start.elapsed(), &request_id);

    response
}

/// Pipeline adapter: builds the context, runs the chain, substitutes the
/// sanitized request.
async fn security_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let inner = state.inner.load_full();

    let request_id = request.request_id().unwrap_or("unknown").to_string();
    let identity = match request.extensions().get::<Identity>() {
        Some(identity) => Some(identity.clone()),
        None => inner
            .identity_resolver
            .as_ref()
            .and_then(|resolver| resolver(request.headers())),
    };

    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();
    let query = parse_query(parts.uri.query());
    let content_length = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    // Buffer the body up front; the size gate already bounds what we read.
    let max_read = inner.config.request.max_body_bytes as usize;
    let body_bytes = match to_bytes(body, max_read).await {
        Ok(bytes) => bytes,
        Err(_) => {
            metrics::record_rejection("body_size", ErrorCode::PayloadTooLarge.as_str());
            return Rejection::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorCode::PayloadTooLarge,
                format!(
                    "Request body exceeds {} bytes",
                    inner.config.request.max_body_bytes
                ),
            )
            .into_response();
        }
    };

    let media_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase());

    let json_body = match media_type.as_deref() {
        Some("application/json") if !body_bytes.is_empty() => {
            serde_json::from_slice::<Value>(&body_bytes).ok()
        }
        _ => None,
    };

    let files = if media_type.as_deref() == Some("multipart/form-data") {
        collect_file_descriptors(&parts, body_bytes.clone()).await
    } else {
        Vec::new()
    };

    let ctx = RequestContext {
        method: parts.method.clone(),
        path,
        headers: parts.headers.clone(),
        client_ip: addr.ip(),
        content_length,
        query,
        body: json_body.clone(),
        params: Value::Object(Map::new()),
        files,
        identity,
        request_id,
    };

    let ctx = match inner.pipeline.run(ctx).await {
        Ok(ctx) => ctx,
        Err(rejection) => return rejection.into_response(),
    };

    // Substitute the sanitized context into the outgoing request.
    let mut parts = parts;
    if let Some(new_uri) = rebuild_uri(&parts.uri, &ctx.query) {
        parts.uri = new_uri;
    }

    let new_body = match (&json_body, &ctx.body) {
        (Some(_), Some(clean)) => match serde_json::to_vec(clean) {
            Ok(bytes) => {
                parts.headers.insert(
                    header::CONTENT_LENGTH,
                    HeaderValue::from_str(&bytes.len().to_string())
                        .unwrap_or(HeaderValue::from_static("0")),
                );
                Body::from(bytes)
            }
            Err(_) => Body::from(body_bytes),
        },
        _ => Body::from(body_bytes),
    };

    let mut request = Request::from_parts(parts, new_body);
    request.extensions_mut().insert(SanitizedRequest {
        body: ctx.body,
        query: ctx.query,
        params: ctx.params,
    });

    next.run(request).await
}

/// Parse the raw query string, preserving repeated keys as arrays.
fn parse_query(raw: Option<&str>) -> Value {
    let mut map = Map::new();
    if let Some(raw) = raw {
        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            let key = key.into_owned();
            let value = Value::String(value.into_owned());
            match map.get_mut(&key) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    map.insert(key, value);
                }
            }
        }
    }
    Value::Object(map)
}

/// Re-serialize the resolved query onto the request URI.
fn rebuild_uri(uri: &Uri, query: &Value) -> Option<Uri> {
    let map = query.as_object()?;
    let path = uri.path();
    if map.is_empty() {
        return uri.query().is_some().then(|| {
            Uri::builder()
                .path_and_query(path)
                .build()
                .unwrap_or_else(|_| uri.clone())
        });
    }

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in map {
        match value {
            Value::Array(items) => {
                for item in items {
                    serializer.append_pair(key, &scalar_to_string(item));
                }
            }
            other => {
                serializer.append_pair(key, &scalar_to_string(other));
            }
        }
    }
    let encoded = serializer.finish();
    Uri::builder()
        .path_and_query(format!("{path}?{encoded}"))
        .build()
        .ok()
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Extract upload descriptors from a buffered multipart body.
///
/// Parse failures yield no descriptors; a malformed multipart body is the
/// handler's problem, not a security rejection.
async fn collect_file_descriptors(
    parts: &axum::http::request::Parts,
    body_bytes: axum::body::Bytes,
) -> Vec<FileUpload> {
    let mut builder = Request::builder()
        .method(parts.method.clone())
        .uri(parts.uri.clone());
    if let Some(headers) = builder.headers_mut() {
        headers.extend(parts.headers.clone());
    }
    let request = match builder.body(Body::from(body_bytes)) {
        Ok(request) => request,
        Err(_) => return Vec::new(),
    };

    let mut multipart = match Multipart::from_request(request, &()).await {
        Ok(multipart) => multipart,
        Err(_) => return Vec::new(),
    };

    let mut files = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let size = match field.bytes().await {
            Ok(data) => data.len() as u64,
            Err(_) => break,
        };
        files.push(FileUpload {
            filename,
            content_type,
            size,
        });
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn repeated_query_keys_become_arrays() {
        let query = parse_query(Some("sort=price&sort=name&page=2"));
        assert_eq!(
            query,
            json!({"sort": ["price", "name"], "page": "2"})
        );
    }

    #[test]
    fn empty_query_is_an_empty_object() {
        assert_eq!(parse_query(None), json!({}));
    }

    #[test]
    fn rebuild_uri_flattens_resolved_query() {
        let uri: Uri = "/api/products?sort=price&sort=name".parse().unwrap();
        let resolved = json!({"sort": "name"});
        let rebuilt = rebuild_uri(&uri, &resolved).unwrap();
        assert_eq!(rebuilt.path(), "/api/products");
        assert_eq!(rebuilt.query(), Some("sort=name"));
    }

    #[test]
    fn rebuild_uri_preserves_allow_listed_arrays() {
        let uri: Uri = "/api/products?tags=a&tags=b".parse().unwrap();
        let resolved = json!({"tags": ["a", "b"]});
        let rebuilt = rebuild_uri(&uri, &resolved).unwrap();
        assert_eq!(rebuilt.query(), Some("tags=a&tags=b"));
    }
}
