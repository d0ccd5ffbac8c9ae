// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Request rate limiting
//!
//! Keyed GCRA limiters (`governor`) built from the `rate_limits` section of
//! the configuration. A rule of `max_requests` per `window_seconds` allows a
//! burst of `max_requests` and replenishes one request every
//! `window_seconds / max_requests`.

use axum::http::HeaderMap;
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::config::{RateLimitConfig, RateLimitRule};
use crate::presentation::error::ApiError;

pub struct KeyedLimiter {
    name: &'static str,
    message: &'static str,
    limiter: DefaultKeyedRateLimiter<String>,
    clock: DefaultClock,
}

impl KeyedLimiter {
    pub fn new(name: &'static str, rule: RateLimitRule, message: &'static str) -> Self {
        let burst = NonZeroU32::new(rule.max_requests.max(1)).unwrap_or(NonZeroU32::MIN);
        let window = Duration::from_secs(rule.window_seconds.max(1));
        let period = window / burst.get();
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);

        Self {
            name,
            message,
            limiter: RateLimiter::keyed(quota),
            clock: DefaultClock::default(),
        }
    }

    /// Consume one request for `key`, or fail with a 429 carrying the wait time
    pub fn check(&self, key: &str) -> Result<(), ApiError> {
        match self.limiter.check_key(&key.to_string()) {
            Ok(()) => Ok(()),
            Err(not_until) => {
                let wait = not_until.wait_time_from(self.clock.now());
                warn!(limiter = self.name, key = %key, "Rate limit exceeded");
                metrics::counter!("intake_rate_limited_total", "limiter" => self.name).increment(1);
                Err(ApiError::TooManyRequests {
                    message: self.message.to_string(),
                    retry_after_secs: wait.as_secs().max(1),
                })
            }
        }
    }

    fn retain_recent(&self) {
        self.limiter.retain_recent();
    }

    pub fn tracked_keys(&self) -> usize {
        self.limiter.len()
    }
}

/// Every limiter applied by the HTTP surface
pub struct RateLimiters {
    pub public_api: KeyedLimiter,
    pub private_api: KeyedLimiter,
    pub submissions: KeyedLimiter,
    pub demo_session_submissions: KeyedLimiter,
    pub demo_ip_submissions: KeyedLimiter,
    pub demo_api: KeyedLimiter,
}

impl RateLimiters {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            public_api: KeyedLimiter::new(
                "public_api",
                config.public_api,
                "Too many requests from this IP, please try again later.",
            ),
            private_api: KeyedLimiter::new(
                "private_api",
                config.private_api,
                "Too many requests, please try again later.",
            ),
            submissions: KeyedLimiter::new(
                "submissions",
                config.submissions,
                "Too many application submissions. Please wait before submitting again.",
            ),
            demo_session_submissions: KeyedLimiter::new(
                "demo_session_submissions",
                config.demo_session_submissions,
                "Too many submissions for this demo session. Please wait 1 hour or start a new demo session.",
            ),
            demo_ip_submissions: KeyedLimiter::new(
                "demo_ip_submissions",
                config.demo_ip_submissions,
                "Too many submissions from this IP address. Please wait 1 hour.",
            ),
            demo_api: KeyedLimiter::new(
                "demo_api",
                config.demo_api,
                "Too many requests for this demo session. Please wait 15 minutes.",
            ),
        }
    }

    /// Drop state for keys whose budget has fully replenished
    pub fn retain_recent(&self) {
        self.public_api.retain_recent();
        self.private_api.retain_recent();
        self.submissions.retain_recent();
        self.demo_session_submissions.retain_recent();
        self.demo_ip_submissions.retain_recent();
        self.demo_api.retain_recent();
    }

    /// Periodically forget idle keys so limiter state stays bounded
    pub fn start_housekeeping(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        info!("Starting rate limiter housekeeping every {:?}", every);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.retain_recent();
                debug!(
                    submissions = self.submissions.tracked_keys(),
                    demo_sessions = self.demo_api.tracked_keys(),
                    "Rate limiter state pruned"
                );
            }
        })
    }
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}

/// Client address: first `X-Forwarded-For` hop, then the socket peer
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_budget_is_per_key() {
        let limiter = KeyedLimiter::new("test", RateLimitRule::new(2, 3600), "slow down");

        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_ok());
        let err = limiter.check("a").unwrap_err();
        assert!(matches!(err, ApiError::TooManyRequests { retry_after_secs, .. } if retry_after_secs > 0));

        assert!(limiter.check("b").is_ok());
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn test_one_submission_per_hour_by_default() {
        let limiters = RateLimiters::default();
        assert!(limiters.submissions.check("user-1").is_ok());
        assert!(limiters.submissions.check("user-1").is_err());
        assert!(limiters.submissions.check("user-2").is_ok());
    }

    #[test]
    fn test_client_ip_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "10.0.0.9:5000".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer)), "10.0.0.9");
        assert_eq!(client_ip(&headers, None), "unknown");

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_ip(&headers, Some(peer)), "203.0.113.7");
    }
}
