//! Injection and parameter-pollution guards.
//!
//! # Responsibilities
//! - Neutralize document-query operator characters in object keys
//!   (leading `$`, embedded `.`) by rewriting them to `_`
//! - Collapse repeated query parameters to a single value, except for
//!   fields that are intentionally array-valued
//!
//! # Design Decisions
//! - Both guards are non-blocking: the rewritten request always proceeds
//! - Key rewrites are reported (key + client IP) through the audit log,
//!   since they usually indicate probing
//! - Pollution resolution is last-wins

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;

use crate::pipeline::{RequestContext, Stage, StageOutcome};

/// Rewrite operator characters in every object key, recursively.
///
/// Returns the rewritten value and the list of original keys that were
/// touched.
pub fn neutralize_keys(value: Value) -> (Value, Vec<String>) {
    let mut flagged = Vec::new();
    let out = neutralize_inner(value, &mut flagged);
    (out, flagged)
}

fn neutralize_inner(value: Value, flagged: &mut Vec<String>) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, v)| {
                    let clean = rewrite_key(&key);
                    if clean != key {
                        flagged.push(key);
                    }
                    (clean, neutralize_inner(v, flagged))
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| neutralize_inner(item, flagged))
                .collect(),
        ),
        other => other,
    }
}

fn rewrite_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for (i, c) in key.chars().enumerate() {
        if (i == 0 && c == '$') || c == '.' {
            out.push('_');
        } else {
            out.push(c);
        }
    }
    out
}

/// Collapse array-valued query parameters to their last value unless the
/// field name is on the array allow-list.
pub fn resolve_pollution(query: Value, array_fields: &[String]) -> Value {
    match query {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, v)| {
                    let v = match v {
                        Value::Array(mut items)
                            if !array_fields.iter().any(|f| f == &key) =>
                        {
                            items.pop().unwrap_or(Value::Null)
                        }
                        other => other,
                    };
                    (key, v)
                })
                .collect(),
        ),
        other => other,
    }
}

/// Pipeline stage running both guards over body and query.
pub struct InjectionGuardStage {
    array_fields: Vec<String>,
}

impl InjectionGuardStage {
    pub fn new(array_fields: Vec<String>) -> Self {
        Self { array_fields }
    }
}

impl Stage for InjectionGuardStage {
    fn name(&self) -> &'static str {
        "injection_guard"
    }

    fn apply<'a>(&'a self, mut ctx: RequestContext) -> BoxFuture<'a, StageOutcome> {
        async move {
            let mut flagged = Vec::new();

            if let Some(body) = ctx.body.take() {
                let (clean, keys) = neutralize_keys(body);
                ctx.body = Some(clean);
                flagged.extend(keys);
            }

            let query = std::mem::take(&mut ctx.query);
            let (query, keys) = neutralize_keys(query);
            flagged.extend(keys);
            ctx.query = resolve_pollution(query, &self.array_fields);

            let params = std::mem::take(&mut ctx.params);
            let (params, keys) = neutralize_keys(params);
            flagged.extend(keys);
            ctx.params = params;

            for key in &flagged {
                tracing::warn!(
                    target: "audit",
                    client = %ctx.client_ip,
                    key = %key,
                    path = %ctx.path,
                    "Query-operator characters neutralized in key"
                );
                crate::observability::metrics::record_key_neutralized();
            }

            StageOutcome::Continue(ctx)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn leading_dollar_is_rewritten() {
        let (out, flagged) = neutralize_keys(json!({"$where": "1 == 1"}));
        assert_eq!(out, json!({"_where": "1 == 1"}));
        assert_eq!(flagged, vec!["$where".to_string()]);
    }

    #[test]
    fn embedded_dots_are_rewritten() {
        let (out, flagged) = neutralize_keys(json!({"a.b.c": 1}));
        assert_eq!(out, json!({"a_b_c": 1}));
        assert_eq!(flagged.len(), 1);
    }

    #[test]
    fn non_leading_dollar_is_kept() {
        let (out, flagged) = neutralize_keys(json!({"price$": 5}));
        assert_eq!(out, json!({"price$": 5}));
        assert!(flagged.is_empty());
    }

    #[test]
    fn recurses_into_nested_objects_and_arrays() {
        let (out, flagged) = neutralize_keys(json!({
            "filter": [{"$gt": 10}, {"ok": true}],
            "inner": {"$ne": null}
        }));
        assert_eq!(
            out,
            json!({
                "filter": [{"_gt": 10}, {"ok": true}],
                "inner": {"_ne": null}
            })
        );
        assert_eq!(flagged.len(), 2);
    }

    #[test]
    fn pollution_collapses_to_last_value() {
        let out = resolve_pollution(json!({"sort": ["price", "name"]}), &[]);
        assert_eq!(out, json!({"sort": "name"}));
    }

    #[test]
    fn pollution_keeps_allow_listed_arrays() {
        let allow = vec!["tags".to_string()];
        let out = resolve_pollution(
            json!({"tags": ["red", "blue"], "sort": ["a", "b"]}),
            &allow,
        );
        assert_eq!(out, json!({"tags": ["red", "blue"], "sort": "b"}));
    }

    #[tokio::test]
    async fn stage_rewrites_and_always_continues() {
        use crate::pipeline::context::test_context;

        let mut ctx = test_context();
        ctx.body = Some(json!({"$set": {"role": "admin"}}));
        ctx.query = json!({"page": ["1", "2"]});
        let stage = InjectionGuardStage::new(vec![]);
        match stage.apply(ctx).await {
            StageOutcome::Continue(out) => {
                assert_eq!(out.body, Some(json!({"_set": {"role": "admin"}})));
                assert_eq!(out.query, json!({"page": "2"}));
            }
            StageOutcome::Reject(_) => panic!("guard is non-blocking"),
        }
    }
}
