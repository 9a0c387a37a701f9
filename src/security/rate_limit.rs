//! Fixed-window rate limiting with per-path profiles.
//!
//! Counters live behind the `WindowStore` trait so a single-process map
//! can be swapped for a distributed store without touching call sites.
//! State is in-memory best-effort and resets on process restart.

use axum::http::{HeaderValue, StatusCode};
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::pipeline::{ErrorCode, Rejection, RequestContext, Stage, StageOutcome};

/// Snapshot of a window after an increment.
#[derive(Clone, Copy, Debug)]
pub struct WindowState {
    /// Requests counted in the current window, including this one.
    pub count: u64,
    /// Time remaining until the window resets.
    pub resets_in: Duration,
}

/// Store for per-key fixed windows.
///
/// `hit` must perform increment-and-check atomically per key so concurrent
/// bursts from one client cannot undercount.
pub trait WindowStore: Send + Sync {
    fn hit(&self, key: &str, window: Duration, now: Instant) -> WindowState;

    /// Drop the window for a key. Returns whether one existed.
    fn reset(&self, key: &str) -> bool;

    /// Number of windows currently tracked.
    fn tracked(&self) -> usize;
}

struct WindowRecord {
    count: u64,
    started: Instant,
}

/// In-process window store backed by a concurrent map.
///
/// The map's entry lock provides the per-key atomicity the contract
/// requires.
#[derive(Default)]
pub struct MemoryWindowStore {
    windows: DashMap<String, WindowRecord>,
}

impl MemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WindowStore for MemoryWindowStore {
    fn hit(&self, key: &str, window: Duration, now: Instant) -> WindowState {
        let mut record = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| WindowRecord {
                count: 0,
                started: now,
            });
        if now.duration_since(record.started) >= window {
            record.count = 0;
            record.started = now;
        }
        record.count += 1;
        WindowState {
            count: record.count,
            resets_in: window.saturating_sub(now.duration_since(record.started)),
        }
    }

    fn reset(&self, key: &str) -> bool {
        self.windows.remove(key).is_some()
    }

    fn tracked(&self) -> usize {
        self.windows.len()
    }
}

/// Parameters for one named limiter profile.
#[derive(Clone, Debug)]
pub struct Profile {
    pub name: &'static str,
    pub window: Duration,
    pub max: u64,
    pub message: String,
}

/// Single-profile fixed-window limiter over an injected store.
pub struct RateLimiter {
    profile: Profile,
    store: Arc<dyn WindowStore>,
}

/// Outcome of one limiter check.
pub enum LimitDecision {
    Allowed { remaining: u64 },
    Limited { retry_after: Duration },
}

impl RateLimiter {
    pub fn new(profile: Profile, store: Arc<dyn WindowStore>) -> Self {
        Self { profile, store }
    }

    pub fn check(&self, key: &str, now: Instant) -> LimitDecision {
        let namespaced = format!("{}:{}", self.profile.name, key);
        let state = self.store.hit(&namespaced, self.profile.window, now);
        if state.count > self.profile.max {
            LimitDecision::Limited {
                retry_after: state.resets_in,
            }
        } else {
            LimitDecision::Allowed {
                remaining: self.profile.max - state.count,
            }
        }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }
}

/// Pipeline stage dispatching to the auth / payment / api profiles.
pub struct RateLimitStage {
    auth: RateLimiter,
    api: RateLimiter,
    payment: RateLimiter,
    auth_paths: Vec<String>,
    payment_prefixes: Vec<String>,
    bypass_paths: Vec<String>,
}

impl RateLimitStage {
    pub fn from_config(config: &RateLimitConfig, store: Arc<dyn WindowStore>) -> Self {
        Self {
            auth: RateLimiter::new(
                Profile {
                    name: "auth",
                    window: Duration::from_secs(config.auth.window_secs),
                    max: config.auth.max,
                    message: config.auth.message.clone(),
                },
                store.clone(),
            ),
            api: RateLimiter::new(
                Profile {
                    name: "api",
                    window: Duration::from_secs(config.api.window_secs),
                    max: config.api.max,
                    message: config.api.message.clone(),
                },
                store.clone(),
            ),
            payment: RateLimiter::new(
                Profile {
                    name: "payment",
                    window: Duration::from_secs(config.payment.window_secs),
                    max: config.payment.max,
                    message: config.payment.message.clone(),
                },
                store,
            ),
            auth_paths: config.auth_paths.clone(),
            payment_prefixes: config.payment_path_prefixes.clone(),
            bypass_paths: config.bypass_paths.clone(),
        }
    }

    fn limiter_for(&self, path: &str) -> &RateLimiter {
        if self.auth_paths.iter().any(|p| p == path) {
            &self.auth
        } else if self.payment_prefixes.iter().any(|p| path.starts_with(p)) {
            &self.payment
        } else {
            &self.api
        }
    }
}

impl Stage for RateLimitStage {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn apply<'a>(&'a self, ctx: RequestContext) -> BoxFuture<'a, StageOutcome> {
        async move {
            if self.bypass_paths.iter().any(|p| p == &ctx.path) {
                return StageOutcome::Continue(ctx);
            }

            let limiter = self.limiter_for(&ctx.path);
            let key = ctx.client_ip.to_string();
            match limiter.check(&key, Instant::now()) {
                LimitDecision::Allowed { .. } => StageOutcome::Continue(ctx),
                LimitDecision::Limited { retry_after } => {
                    tracing::warn!(
                        client = %ctx.client_ip,
                        path = %ctx.path,
                        profile = limiter.profile().name,
                        "Rate limit exceeded"
                    );
                    crate::observability::metrics::record_rate_limited(limiter.profile().name);

                    let profile = limiter.profile();
                    let retry_secs = retry_after.as_secs().max(1);
                    let rejection = Rejection::new(
                        StatusCode::TOO_MANY_REQUESTS,
                        ErrorCode::RateLimitExceeded,
                        profile.message.clone(),
                    )
                    .with_header(axum::http::header::RETRY_AFTER, header_value(retry_secs))
                    .with_header(
                        axum::http::HeaderName::from_static("ratelimit-limit"),
                        header_value(profile.max),
                    )
                    .with_header(
                        axum::http::HeaderName::from_static("ratelimit-remaining"),
                        HeaderValue::from_static("0"),
                    );
                    StageOutcome::Reject(rejection)
                }
            }
        }
        .boxed()
    }
}

fn header_value(n: u64) -> HeaderValue {
    HeaderValue::from_str(&n.to_string()).unwrap_or(HeaderValue::from_static("0"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u64, window_secs: u64) -> RateLimiter {
        RateLimiter::new(
            Profile {
                name: "test",
                window: Duration::from_secs(window_secs),
                max,
                message: "slow down".to_string(),
            },
            Arc::new(MemoryWindowStore::new()),
        )
    }

    #[test]
    fn allows_up_to_max_then_rejects() {
        let limiter = limiter(5, 900);
        let now = Instant::now();
        for _ in 0..5 {
            assert!(matches!(
                limiter.check("1.2.3.4", now),
                LimitDecision::Allowed { .. }
            ));
        }
        assert!(matches!(
            limiter.check("1.2.3.4", now),
            LimitDecision::Limited { .. }
        ));
    }

    #[test]
    fn window_elapse_resets_the_count() {
        let limiter = limiter(3, 60);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.check("9.9.9.9", start);
        }
        assert!(matches!(
            limiter.check("9.9.9.9", start),
            LimitDecision::Limited { .. }
        ));
        // Just past the window, the client gets a fresh budget.
        let later = start + Duration::from_secs(61);
        assert!(matches!(
            limiter.check("9.9.9.9", later),
            LimitDecision::Allowed { .. }
        ));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = limiter(1, 60);
        let now = Instant::now();
        assert!(matches!(
            limiter.check("1.1.1.1", now),
            LimitDecision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check("2.2.2.2", now),
            LimitDecision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check("1.1.1.1", now),
            LimitDecision::Limited { .. }
        ));
    }

    #[test]
    fn concurrent_hits_are_not_undercounted() {
        let store = Arc::new(MemoryWindowStore::new());
        let window = Duration::from_secs(60);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    store.hit("burst", window, Instant::now());
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        let state = store.hit("burst", window, Instant::now());
        assert_eq!(state.count, 801);
    }

    #[test]
    fn store_reset_drops_the_window() {
        let store = MemoryWindowStore::new();
        store.hit("k", Duration::from_secs(60), Instant::now());
        assert_eq!(store.tracked(), 1);
        assert!(store.reset("k"));
        assert_eq!(store.tracked(), 0);
        assert!(!store.reset("k"));
    }

    #[test]
    fn profiles_share_store_without_collisions() {
        let store: Arc<dyn WindowStore> = Arc::new(MemoryWindowStore::new());
        let auth = RateLimiter::new(
            Profile {
                name: "auth",
                window: Duration::from_secs(900),
                max: 1,
                message: String::new(),
            },
            store.clone(),
        );
        let api = RateLimiter::new(
            Profile {
                name: "api",
                window: Duration::from_secs(900),
                max: 1,
                message: String::new(),
            },
            store,
        );
        let now = Instant::now();
        auth.check("1.2.3.4", now);
        // Same client, different profile: fresh budget.
        assert!(matches!(
            api.check("1.2.3.4", now),
            LimitDecision::Allowed { .. }
        ));
    }
}
