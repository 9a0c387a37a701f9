//! Recursive markup sanitizer.
//!
//! # Responsibilities
//! - Strip all markup from string leaves, including `<script>` bodies
//! - Recurse into nested objects and arrays, preserving shape
//! - Leave non-string leaves untouched
//!
//! # Design Decisions
//! - Total function: never errors, never panics on any input
//! - Recursion is bounded; values nested deeper than `MAX_DEPTH` are
//!   returned unchanged
//! - Idempotent: sanitizing already-clean input returns it unchanged

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::pipeline::{RequestContext, Stage, StageOutcome};

/// Maximum nesting depth the sanitizer will descend into.
pub const MAX_DEPTH: usize = 32;

/// `<script>` elements are removed together with their bodies.
static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("valid regex"));

/// Any remaining tag is stripped, keeping surrounding text.
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));

/// Remove all markup from a single string.
pub fn strip_markup(input: &str) -> String {
    let without_scripts = SCRIPT_RE.replace_all(input, "");
    TAG_RE.replace_all(&without_scripts, "").into_owned()
}

/// Sanitize every string leaf of a JSON value, preserving shape.
pub fn sanitize_value(value: Value) -> Value {
    sanitize_at_depth(value, 0)
}

fn sanitize_at_depth(value: Value, depth: usize) -> Value {
    if depth >= MAX_DEPTH {
        return value;
    }
    match value {
        Value::String(s) => Value::String(strip_markup(&s)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| sanitize_at_depth(item, depth + 1))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, sanitize_at_depth(v, depth + 1)))
                .collect(),
        ),
        other => other,
    }
}

/// Pipeline stage applying the sanitizer to body, query and params.
pub struct SanitizeStage;

impl Stage for SanitizeStage {
    fn name(&self) -> &'static str {
        "sanitize"
    }

    fn apply<'a>(&'a self, mut ctx: RequestContext) -> BoxFuture<'a, StageOutcome> {
        async move {
            if let Some(body) = ctx.body.take() {
                ctx.body = Some(sanitize_value(body));
            }
            let query = std::mem::take(&mut ctx.query);
            ctx.query = sanitize_value(query);
            let params = std::mem::take(&mut ctx.params);
            ctx.params = sanitize_value(params);
            StageOutcome::Continue(ctx)
        }
        .boxed()
    }
}
