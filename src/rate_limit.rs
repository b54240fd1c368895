//! Fixed-window request limiting for the payment-intent endpoint.
//!
//! `InMemoryRateLimiter` keeps its counters in-process, so limits are per
//! instance. A shared backend would implement `RateLimiter` instead.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, key: &str) -> RateLimitDecision;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    started_at: DateTime<Utc>,
    count: u32,
}

pub struct InMemoryRateLimiter {
    windows: Cache<String, Window>,
    max_requests: u32,
    window: Duration,
}

impl InMemoryRateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        let windows = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(window)
            .build();
        Self {
            windows,
            max_requests,
            window,
        }
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, key: &str) -> RateLimitDecision {
        let now = Instant::now();
        let window = self.window;

        let entry = self
            .windows
            .entry(key.to_string())
            .and_upsert_with(|existing| {
                let next = match existing.map(|entry| entry.into_value()) {
                    Some(current) if now.duration_since(current.started) < window => Window {
                        count: current.count.saturating_add(1),
                        ..current
                    },
                    _ => Window {
                        started: now,
                        started_at: Utc::now(),
                        count: 1,
                    },
                };
                std::future::ready(next)
            })
            .await;
        let current = entry.into_value();

        let reset_at = current.started_at
            + chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::seconds(60));
        RateLimitDecision {
            allowed: current.count <= self.max_requests,
            remaining: self.max_requests.saturating_sub(current.count),
            reset_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocks_after_quota_within_window() {
        let limiter = InMemoryRateLimiter::new(5, Duration::from_secs(60));
        for expected_remaining in (0..5).rev() {
            let decision = limiter.check("client:1").await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let blocked = limiter.check("client:1").await;
        assert!(!blocked.allowed);
        assert!(blocked.reset_at > Utc::now());

        assert!(limiter.check("client:2").await.allowed);
    }

    #[tokio::test]
    async fn window_resets() {
        let limiter = InMemoryRateLimiter::new(1, Duration::from_millis(50));
        assert!(limiter.check("k").await.allowed);
        assert!(!limiter.check("k").await.allowed);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(limiter.check("k").await.allowed);
    }
}
