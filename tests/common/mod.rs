//! Shared utilities for integration testing.

use axum::{
    extract::Request,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use security_gateway::http::server::IdentityResolver;
use security_gateway::{GatewayConfig, GatewayServer, Identity, Role, SanitizedRequest, Shutdown};

/// Token the test identity resolver binds to every session.
pub const TEST_CSRF_TOKEN: &str = "test-csrf-secret";

/// Header that makes the test resolver attach an identity.
pub const TEST_USER_HEADER: &str = "x-test-user";

/// Start a gateway wrapping the demo application on an ephemeral port.
pub async fn spawn_gateway(config: GatewayConfig) -> (SocketAddr, Shutdown) {
    spawn_gateway_with(config, demo_app()).await
}

/// Start a gateway wrapping the given application router.
pub async fn spawn_gateway_with(config: GatewayConfig, app: Router) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let resolver: IdentityResolver = Arc::new(|headers| {
        headers
            .get(TEST_USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|user| Identity {
                id: user.to_string(),
                role: if user == "admin" { Role::Admin } else { Role::User },
                csrf_token: Some(TEST_CSRF_TOKEN.to_string()),
            })
    });

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let (_config_tx, config_updates) = mpsc::unbounded_channel();
    let server = GatewayServer::with_identity_resolver(config, app, Some(resolver));

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    // Give the listener a moment to start accepting
    tokio::time::sleep(Duration::from_millis(100)).await;

    (addr, shutdown)
}

/// Routes standing in for the protected application.
pub fn demo_app() -> Router {
    Router::new()
        .route("/api/user/login", post(ok_handler))
        .route("/api/user/register", post(ok_handler))
        .route("/api/products", get(echo_handler).post(echo_handler))
        .route("/api/payment/charge", post(ok_handler))
        .route("/api/order/place", post(ok_handler))
        .route("/api/upload", post(ok_handler))
        .route("/api/admin/products", post(ok_handler))
}

async fn ok_handler() -> Json<Value> {
    Json(json!({ "success": true }))
}

/// Echoes the sanitized body and query the gateway attached.
async fn echo_handler(request: Request) -> Json<Value> {
    let sanitized = request.extensions().get::<SanitizedRequest>().cloned();
    Json(json!({
        "success": true,
        "body": sanitized.as_ref().and_then(|s| s.body.clone()),
        "query": sanitized.as_ref().map(|s| s.query.clone()),
    }))
}

/// A client that does not reuse connections between tests.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Extract the machine-readable error code from a rejection body.
pub async fn error_code(res: reqwest::Response) -> String {
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], json!(false));
    body["error"].as_str().unwrap_or_default().to_string()
}
