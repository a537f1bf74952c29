//! Per-provider rate limiter.
//!
//! Two independent rolling windows per provider: tokens per hour and
//! requests per minute. Counters reset when their window has fully
//! elapsed. The limiter is consulted before every LLM call and may also
//! gate expensive tool bodies.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use llamar_domain::config::RateLimitConfig;

/// Outcome of a rate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateCheck {
    Ok,
    /// Allowed, but usage is at or past 80% of the hourly token cap.
    Warn(String),
    /// Refused; the message says when to retry.
    Exceeded(String),
}

impl RateCheck {
    pub fn allowed(&self) -> bool {
        !matches!(self, RateCheck::Exceeded(_))
    }
}

struct ProviderWindows {
    tokens_hour: u64,
    requests_minute: u32,
    hour_start: DateTime<Utc>,
    minute_start: DateTime<Utc>,
}

impl ProviderWindows {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            tokens_hour: 0,
            requests_minute: 0,
            hour_start: now,
            minute_start: now,
        }
    }

    fn roll_over(&mut self, now: DateTime<Utc>) {
        if now - self.hour_start >= Duration::hours(1) {
            self.hour_start = now;
            self.tokens_hour = 0;
        }
        if now - self.minute_start >= Duration::minutes(1) {
            self.minute_start = now;
            self.requests_minute = 0;
        }
    }
}

/// Lock-protected per-provider usage windows.
pub struct RateLimiter {
    limits: HashMap<String, RateLimitConfig>,
    windows: RwLock<HashMap<String, ProviderWindows>>,
}

impl RateLimiter {
    pub fn new(limits: HashMap<String, RateLimitConfig>) -> Self {
        Self {
            limits,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Check whether a call estimated at `est_tokens` may proceed.
    pub fn check(&self, provider: &str, est_tokens: u64) -> RateCheck {
        let Some(limit) = self.limits.get(provider) else {
            return RateCheck::Ok;
        };

        let now = Utc::now();
        let mut windows = self.windows.write();
        let w = windows
            .entry(provider.to_string())
            .or_insert_with(|| ProviderWindows::new(now));
        w.roll_over(now);

        if let Some(cap) = limit.requests_per_minute {
            if w.requests_minute >= cap {
                let retry_secs =
                    60 - (now - w.minute_start).num_seconds().clamp(0, 60);
                return RateCheck::Exceeded(format!(
                    "Rate limit exceeded: {provider} allows {cap} requests/minute; \
                     try again in {retry_secs} seconds"
                ));
            }
        }

        if let Some(cap) = limit.tokens_per_hour {
            if w.tokens_hour.saturating_add(est_tokens) > cap {
                let retry_mins =
                    60 - (now - w.hour_start).num_minutes().clamp(0, 60);
                return RateCheck::Exceeded(format!(
                    "Rate limit exceeded: {provider} allows {cap} tokens/hour; \
                     try again in {retry_mins} minutes"
                ));
            }
            let projected = w.tokens_hour + est_tokens;
            if projected * 5 >= cap * 4 {
                return RateCheck::Warn(format!(
                    "Approaching token limit: {projected}/{cap} tokens used this hour for {provider}"
                ));
            }
        }

        RateCheck::Ok
    }

    /// Record consumed tokens and requests.
    pub fn track(&self, provider: &str, tokens: u64, requests: u32) {
        let now = Utc::now();
        let mut windows = self.windows.write();
        let w = windows
            .entry(provider.to_string())
            .or_insert_with(|| ProviderWindows::new(now));
        w.roll_over(now);
        w.tokens_hour = w.tokens_hour.saturating_add(tokens);
        w.requests_minute = w.requests_minute.saturating_add(requests);
    }
}
