//! Progressive response-delay governor.
//!
//! # Responsibilities
//! - Track request counts per client in a fixed window
//! - Once a client crosses the threshold, hold each further request for a
//!   growing delay, capped at a maximum
//!
//! # Design Decisions
//! - Throughput shaping, not rejection: this stage never errors
//! - The hold is a cooperative suspension (tokio sleep), so concurrent
//!   requests from other clients are unaffected
//! - Shares the window-store abstraction with the rate limiter

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::DelayConfig;
use crate::pipeline::{RequestContext, Stage, StageOutcome};
use crate::security::rate_limit::WindowStore;

/// Governor deciding how long a request should be held.
pub struct DelayGovernor {
    window: Duration,
    threshold: u64,
    delay_per_request: Duration,
    max_delay: Duration,
    store: Arc<dyn WindowStore>,
}

impl DelayGovernor {
    pub fn from_config(config: &DelayConfig, store: Arc<dyn WindowStore>) -> Self {
        Self {
            window: Duration::from_secs(config.window_secs),
            threshold: config.threshold,
            delay_per_request: Duration::from_millis(config.delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            store,
        }
    }

    /// Delay to apply for this request; zero below the threshold.
    ///
    /// The delay grows by one step per request over the threshold and is
    /// capped at the configured maximum.
    pub fn delay_for(&self, key: &str, now: Instant) -> Duration {
        let namespaced = format!("delay:{key}");
        let state = self.store.hit(&namespaced, self.window, now);
        if state.count <= self.threshold {
            return Duration::ZERO;
        }
        let excess = (state.count - self.threshold).min(u32::MAX as u64) as u32;
        let computed = self.delay_per_request.saturating_mul(excess);
        computed.min(self.max_delay)
    }
}

/// Pipeline stage applying the governor.
pub struct DelayStage {
    governor: DelayGovernor,
}

impl DelayStage {
    pub fn new(governor: DelayGovernor) -> Self {
        Self { governor }
    }
}

impl Stage for DelayStage {
    fn name(&self) -> &'static str {
        "delay"
    }

    fn apply<'a>(&'a self, ctx: RequestContext) -> BoxFuture<'a, StageOutcome> {
        async move {
            let delay = self
                .governor
                .delay_for(&ctx.client_ip.to_string(), Instant::now());
            if !delay.is_zero() {
                tracing::debug!(
                    client = %ctx.client_ip,
                    delay_ms = delay.as_millis() as u64,
                    "Holding request"
                );
                crate::observability::metrics::record_delayed(delay);
                tokio::time::sleep(delay).await;
            }
            StageOutcome::Continue(ctx)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::rate_limit::MemoryWindowStore;

    fn governor(threshold: u64, delay_ms: u64, max_delay_ms: u64) -> DelayGovernor {
        DelayGovernor::from_config(
            &DelayConfig {
                enabled: true,
                window_secs: 60,
                threshold,
                delay_ms,
                max_delay_ms,
            },
            Arc::new(MemoryWindowStore::new()),
        )
    }

    #[test]
    fn below_threshold_no_delay() {
        let governor = governor(3, 500, 5_000);
        let now = Instant::now();
        for _ in 0..3 {
            assert_eq!(governor.delay_for("c", now), Duration::ZERO);
        }
    }

    #[test]
    fn delay_grows_past_threshold() {
        let governor = governor(2, 500, 5_000);
        let now = Instant::now();
        governor.delay_for("c", now);
        governor.delay_for("c", now);
        assert_eq!(governor.delay_for("c", now), Duration::from_millis(500));
        assert_eq!(governor.delay_for("c", now), Duration::from_millis(1_000));
    }

    #[test]
    fn delay_is_capped() {
        let governor = governor(0, 1_000, 2_500);
        let now = Instant::now();
        governor.delay_for("c", now);
        governor.delay_for("c", now);
        governor.delay_for("c", now);
        assert_eq!(governor.delay_for("c", now), Duration::from_millis(2_500));
    }

    #[test]
    fn window_elapse_clears_the_slowdown() {
        let governor = governor(1, 500, 5_000);
        let start = Instant::now();
        governor.delay_for("c", start);
        assert!(governor.delay_for("c", start) > Duration::ZERO);
        let later = start + Duration::from_secs(61);
        assert_eq!(governor.delay_for("c", later), Duration::ZERO);
    }
}
