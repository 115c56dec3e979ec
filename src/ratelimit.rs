//! C8 RateLimiter: per-team token bucket, refilled by wall-clock elapsed
//! time (§4.8, §8 "no more than `ceil(ordersPerMin * (1 + Δt/60))`
//! orders... accepted").
//!
//! Shape (per-entity `DashMap` + periodic cleanup task) is grounded on the
//! reference backend's `auth::rate_limit::RateLimiter`; the refill
//! arithmetic is rewritten for a token bucket instead of the reference's
//! sliding window (DESIGN.md C8).

use std::time::{Duration, Instant};

use dashmap::DashMap;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    max_tokens: f64,
}

impl RateLimiter {
    pub fn new(orders_per_min: u32) -> Self {
        let limiter = Self {
            buckets: DashMap::new(),
            max_tokens: orders_per_min as f64,
        };
        let buckets = limiter.buckets.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(600));
            loop {
                interval.tick().await;
                let now = Instant::now();
                buckets.retain(|_, b| now.duration_since(b.last_refill) < Duration::from_secs(600));
            }
        });
        limiter
    }

    /// `Allow(team)`: refills `floor((now - lastRefill) / 1min) *
    /// ordersPerMin` tokens capped at max, then consumes one if available.
    pub fn allow(&self, team_name: &str) -> bool {
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry(team_name.to_string())
            .or_insert_with(|| Bucket {
                tokens: self.max_tokens,
                last_refill: now,
            });

        let elapsed_mins = now.duration_since(bucket.last_refill).as_secs_f64() / 60.0;
        let whole_mins = elapsed_mins.floor();
        if whole_mins >= 1.0 {
            bucket.tokens = (bucket.tokens + whole_mins * self.max_tokens).min(self.max_tokens);
            bucket.last_refill += Duration::from_secs_f64(whole_mins * 60.0);
        }

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_team_gets_full_bucket() {
        let limiter = RateLimiter::new(3);
        assert!(limiter.allow("teamA"));
        assert!(limiter.allow("teamA"));
        assert!(limiter.allow("teamA"));
        assert!(!limiter.allow("teamA"));
    }

    #[test]
    fn teams_are_independent() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.allow("teamA"));
        assert!(limiter.allow("teamB"));
    }
}
