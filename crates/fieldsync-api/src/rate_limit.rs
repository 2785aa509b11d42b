use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::error::AppError;

/// Fixed-window request limiter keyed by endpoint and actor
#[derive(Clone)]
pub struct EndpointRateLimiter {
    state: Arc<Mutex<HashMap<String, RateWindow>>>,
    window: Duration,
    pull_limit: u32,
    push_limit: u32,
    metrics: Arc<RateLimitMetrics>,
}

#[derive(Clone, Copy)]
pub enum ProtectedEndpoint {
    Pull,
    Push,
}

#[derive(Default)]
struct RateLimitMetrics {
    pull_allowed: AtomicU64,
    pull_limited: AtomicU64,
    push_allowed: AtomicU64,
    push_limited: AtomicU64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitMetricsSnapshot {
    pub pull_allowed: u64,
    pub pull_limited: u64,
    pub push_allowed: u64,
    pub push_limited: u64,
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    started_at: Instant,
    count: u32,
}

impl EndpointRateLimiter {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.rate_limit_window,
            config.pull_rate_limit_per_window,
            config.push_rate_limit_per_window,
        )
    }

    fn new(window: Duration, pull_limit: u32, push_limit: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
            window,
            pull_limit,
            push_limit,
            metrics: Arc::new(RateLimitMetrics::default()),
        }
    }

    pub async fn check(&self, endpoint: ProtectedEndpoint, actor: &str) -> Result<(), AppError> {
        let limit = match endpoint {
            ProtectedEndpoint::Pull => self.pull_limit,
            ProtectedEndpoint::Push => self.push_limit,
        };

        let key = format!("{}:{actor}", endpoint.label());
        let now = Instant::now();
        let mut guard = self.state.lock().await;
        guard.retain(|_, window| now.duration_since(window.started_at) < self.window);
        let entry = guard.entry(key).or_insert(RateWindow {
            started_at: now,
            count: 0,
        });

        if entry.count >= limit {
            let retry_after_secs = self
                .window
                .saturating_sub(now.duration_since(entry.started_at))
                .as_secs();
            self.counters(endpoint).1.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                endpoint = endpoint.label(),
                actor = actor_fingerprint(actor),
                retry_after_secs,
                "Rate limit exceeded"
            );
            return Err(AppError::too_many_requests(
                format!("Rate limit exceeded for {}", endpoint.label()),
                retry_after_secs,
            ));
        }

        entry.count += 1;
        self.counters(endpoint).0.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn metrics_snapshot(&self) -> RateLimitMetricsSnapshot {
        RateLimitMetricsSnapshot {
            pull_allowed: self.metrics.pull_allowed.load(Ordering::Relaxed),
            pull_limited: self.metrics.pull_limited.load(Ordering::Relaxed),
            push_allowed: self.metrics.push_allowed.load(Ordering::Relaxed),
            push_limited: self.metrics.push_limited.load(Ordering::Relaxed),
        }
    }

    /// `(allowed, limited)` counters for an endpoint
    fn counters(&self, endpoint: ProtectedEndpoint) -> (&AtomicU64, &AtomicU64) {
        match endpoint {
            ProtectedEndpoint::Pull => (&self.metrics.pull_allowed, &self.metrics.pull_limited),
            ProtectedEndpoint::Push => (&self.metrics.push_allowed, &self.metrics.push_limited),
        }
    }
}

impl ProtectedEndpoint {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pull => "sync_pull",
            Self::Push => "sync_push",
        }
    }
}

pub fn actor_fingerprint(actor: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    actor.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rate_limiter_blocks_after_limit() {
        let limiter = EndpointRateLimiter::new(Duration::from_secs(60), 2, 2);

        limiter.check(ProtectedEndpoint::Push, "device-a").await.unwrap();
        limiter.check(ProtectedEndpoint::Push, "device-a").await.unwrap();

        let err = limiter
            .check(ProtectedEndpoint::Push, "device-a")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TooManyRequests(_, secs) if secs <= 60));

        let metrics = limiter.metrics_snapshot();
        assert_eq!(metrics.push_allowed, 2);
        assert_eq!(metrics.push_limited, 1);
        assert_eq!(metrics.pull_allowed, 0);
    }

    #[tokio::test]
    async fn endpoints_and_actors_have_separate_budgets() {
        let limiter = EndpointRateLimiter::new(Duration::from_secs(60), 1, 1);

        limiter.check(ProtectedEndpoint::Pull, "device-a").await.unwrap();
        limiter.check(ProtectedEndpoint::Push, "device-a").await.unwrap();
        limiter.check(ProtectedEndpoint::Pull, "device-b").await.unwrap();
        assert!(limiter
            .check(ProtectedEndpoint::Pull, "device-a")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn window_resets_after_expiry() {
        let limiter = EndpointRateLimiter::new(Duration::from_millis(20), 1, 1);

        limiter.check(ProtectedEndpoint::Pull, "device-a").await.unwrap();
        assert!(limiter
            .check(ProtectedEndpoint::Pull, "device-a")
            .await
            .is_err());

        tokio::time::sleep(Duration::from_millis(30)).await;
        limiter.check(ProtectedEndpoint::Pull, "device-a").await.unwrap();
    }
}
