//! Security audit logging.
//!
//! # Responsibilities
//! - Emit a structured event before the handler for authentication,
//!   admin and payment/order requests
//! - Emit a suspicious-activity event after any response with status >= 400
//!
//! # Design Decisions
//! - Purely observational: never blocks, never rejects
//! - Events are tracing events with target "audit" so a subscriber can
//!   route them to a dedicated sink

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::net::IpAddr;
use std::time::Duration;

use crate::config::AuditConfig;
use crate::pipeline::{RequestContext, Role, Stage, StageOutcome};

/// Request classes the pre-handler stage reports on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecurityEventKind {
    Authentication,
    AdminAction,
    Payment,
}

impl SecurityEventKind {
    fn as_str(&self) -> &'static str {
        match self {
            SecurityEventKind::Authentication => "authentication",
            SecurityEventKind::AdminAction => "admin_action",
            SecurityEventKind::Payment => "payment",
        }
    }
}

/// Classifier mapping request paths to event kinds.
pub struct AuditStage {
    auth_prefixes: Vec<String>,
    admin_prefixes: Vec<String>,
    payment_prefixes: Vec<String>,
}

impl AuditStage {
    pub fn from_config(config: &AuditConfig) -> Self {
        Self {
            auth_prefixes: config.auth_path_prefixes.clone(),
            admin_prefixes: config.admin_path_prefixes.clone(),
            payment_prefixes: config.payment_path_prefixes.clone(),
        }
    }

    pub fn classify(&self, path: &str) -> Option<SecurityEventKind> {
        if self.auth_prefixes.iter().any(|p| path.starts_with(p)) {
            Some(SecurityEventKind::Authentication)
        } else if self.admin_prefixes.iter().any(|p| path.starts_with(p)) {
            Some(SecurityEventKind::AdminAction)
        } else if self.payment_prefixes.iter().any(|p| path.starts_with(p)) {
            Some(SecurityEventKind::Payment)
        } else {
            None
        }
    }
}

impl Stage for AuditStage {
    fn name(&self) -> &'static str {
        "audit"
    }

    fn apply<'a>(&'a self, ctx: RequestContext) -> BoxFuture<'a, StageOutcome> {
        async move {
            if let Some(kind) = self.classify(&ctx.path) {
                let user_agent = ctx
                    .headers
                    .get(axum::http::header::USER_AGENT)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("<none>");
                let (user_id, role) = match &ctx.identity {
                    Some(identity) => (
                        identity.id.as_str(),
                        match identity.role {
                            Role::Admin => "admin",
                            Role::User => "user",
                        },
                    ),
                    None => ("<anonymous>", "<none>"),
                };
                tracing::info!(
                    target: "audit",
                    kind = kind.as_str(),
                    client = %ctx.client_ip,
                    method = %ctx.method,
                    path = %ctx.path,
                    user_agent,
                    user_id,
                    role,
                    request_id = %ctx.request_id,
                    "Security-relevant request"
                );
                crate::observability::metrics::record_audit_event(kind.as_str());
            }
            StageOutcome::Continue(ctx)
        }
        .boxed()
    }
}

/// Post-response anomaly logging for error statuses.
pub fn record_anomaly(
    client_ip: IpAddr,
    method: &axum::http::Method,
    path: &str,
    status: u16,
    duration: Duration,
    request_id: &str,
) {
    if status < 400 {
        return;
    }
    tracing::warn!(
        target: "audit",
        client = %client_ip,
        method = %method,
        path = %path,
        status,
        duration_ms = duration.as_millis() as u64,
        request_id = %request_id,
        "Suspicious activity"
    );
    crate::observability::metrics::record_anomaly(status);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage() -> AuditStage {
        AuditStage {
            auth_prefixes: vec!["/api/user/login".into(), "/api/user/register".into()],
            admin_prefixes: vec!["/api/admin".into()],
            payment_prefixes: vec!["/api/payment".into(), "/api/order".into()],
        }
    }

    #[test]
    fn classifies_auth_admin_and_payment_paths() {
        let stage = stage();
        assert_eq!(
            stage.classify("/api/user/login"),
            Some(SecurityEventKind::Authentication)
        );
        assert_eq!(
            stage.classify("/api/admin/products"),
            Some(SecurityEventKind::AdminAction)
        );
        assert_eq!(
            stage.classify("/api/order/42"),
            Some(SecurityEventKind::Payment)
        );
        assert_eq!(stage.classify("/api/products"), None);
    }

    #[tokio::test]
    async fn audit_stage_never_rejects() {
        use crate::pipeline::context::test_context;

        let mut ctx = test_context();
        ctx.path = "/api/user/login".to_string();
        assert!(matches!(
            stage().apply(ctx).await,
            StageOutcome::Continue(_)
        ));
    }
}
