// SPDX-License-Identifier: MIT OR Apache-2.0
//! Retry settings, retriable classification, and backoff calculation.

use std::time::{Duration, SystemTime};

/// Message fragments that mark an error as a retriable rate limit.
const RATE_LIMIT_INDICATORS: &[&str] = &[
    "rate limit",
    "too many requests",
    "429",
    "quota exceeded",
    "throttled",
    "rate_limit_error",
    "ratelimiterror",
];

/// An error carrying a server-directed `Retry-After` interval.
///
/// Wrap an upstream rate-limit error in this type to make backoff honor the
/// server's requested delay instead of the exponential schedule.
#[derive(Debug, thiserror::Error)]
#[error("{message} (retry after {retry_after:?})")]
pub struct RetryAfterError {
    /// Human-readable description of the upstream failure.
    pub message: String,
    /// Server-directed wait before the next attempt.
    pub retry_after: Duration,
}

impl RetryAfterError {
    /// Create a retry-after error.
    pub fn new(message: impl Into<String>, retry_after: Duration) -> Self {
        Self {
            message: message.into(),
            retry_after,
        }
    }
}

/// Wraps the final error after a task exhausts its retry budget.
#[derive(Debug, thiserror::Error)]
#[error("max retries ({attempts}) exhausted after {:.1}s: {original}", elapsed.as_secs_f64())]
pub struct RetryExhausted {
    /// The error from the final attempt.
    #[source]
    pub original: anyhow::Error,
    /// How many retries were attempted.
    pub attempts: u32,
    /// Wall-clock time across all attempts.
    pub elapsed: Duration,
}

/// Default retriable classification: true for errors whose message matches
/// a common rate-limit pattern, and for [`RetryAfterError`]s.
#[must_use]
pub fn default_is_retriable(err: &anyhow::Error) -> bool {
    if err.downcast_ref::<RetryAfterError>().is_some() {
        return true;
    }
    let msg = format!("{err:#}").to_lowercase();
    RATE_LIMIT_INDICATORS.iter().any(|ind| msg.contains(ind))
}

/// Extract a server-directed retry-after interval, if the error carries one.
#[must_use]
pub fn extract_retry_after(err: &anyhow::Error) -> Option<Duration> {
    err.downcast_ref::<RetryAfterError>().map(|e| e.retry_after)
}

/// Configuration for retry behavior in rate-limited operations.
#[derive(Clone)]
pub struct RetrySettings {
    /// Retries per task (so up to `max_task_retries + 1` attempts).
    pub max_task_retries: u32,
    /// Cap on total retries across all tasks in one gather, if any.
    pub max_total_retries: Option<u32>,
    /// Base backoff interval.
    pub initial_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
    /// Exponential backoff multiplier.
    pub backoff_factor: f64,
    /// Classification of retriable errors.
    pub is_retriable: fn(&anyhow::Error) -> bool,
}

impl std::fmt::Debug for RetrySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrySettings")
            .field("max_task_retries", &self.max_task_retries)
            .field("max_total_retries", &self.max_total_retries)
            .field("initial_backoff", &self.initial_backoff)
            .field("max_backoff", &self.max_backoff)
            .field("backoff_factor", &self.backoff_factor)
            .finish()
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_task_retries: 3,
            max_total_retries: Some(25),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            backoff_factor: 2.0,
            is_retriable: default_is_retriable,
        }
    }
}

impl RetrySettings {
    /// Disable retries entirely.
    #[must_use]
    pub fn no_retries() -> Self {
        Self {
            max_task_retries: 0,
            max_total_retries: None,
            ..Self::default()
        }
    }
}

/// Compute the backoff before retry `retry_index` (1-based).
///
/// Server-directed `Retry-After` wins, clamped to `max_backoff`. Otherwise
/// `initial_backoff * backoff_factor^(retry_index - 1)` with jitter in
/// `[0.75, 1.25]`, clamped to `max_backoff`.
#[must_use]
pub fn calculate_backoff(
    retry_index: u32,
    err: &anyhow::Error,
    settings: &RetrySettings,
) -> Duration {
    if let Some(retry_after) = extract_retry_after(err) {
        return retry_after.min(settings.max_backoff);
    }

    let exp = settings
        .backoff_factor
        .powi(retry_index.saturating_sub(1) as i32);
    let base = settings.initial_backoff.as_secs_f64() * exp;

    // Clock-derived jitter in [0.75, 1.25]; no RNG needed.
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    let pseudo = nanos.wrapping_mul(u64::from(retry_index) + 1);
    let jitter = 0.75 + (pseudo % 1000) as f64 / 1000.0 * 0.5;

    Duration::from_secs_f64((base * jitter).min(settings.max_backoff.as_secs_f64()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn default_is_retriable_matches_rate_limit_patterns() {
        assert!(default_is_retriable(&anyhow!("Rate limit exceeded")));
        assert!(default_is_retriable(&anyhow!("Too many requests")));
        assert!(default_is_retriable(&anyhow!("HTTP 429 error")));
        assert!(default_is_retriable(&anyhow!("Quota exceeded for org")));
        assert!(default_is_retriable(&anyhow!("Request throttled")));
        assert!(default_is_retriable(&anyhow!("RateLimitError: boom")));

        assert!(!default_is_retriable(&anyhow!("Authentication failed")));
        assert!(!default_is_retriable(&anyhow!("Invalid API key")));
        assert!(!default_is_retriable(&anyhow!("connection refused")));
    }

    #[test]
    fn retry_after_errors_are_retriable() {
        let err = anyhow::Error::new(RetryAfterError::new("slow down", Duration::from_secs(30)));
        assert!(default_is_retriable(&err));
        assert_eq!(extract_retry_after(&err), Some(Duration::from_secs(30)));
    }

    #[test]
    fn backoff_honors_retry_after_with_cap() {
        let settings = RetrySettings::default();
        let err = anyhow::Error::new(RetryAfterError::new("wait", Duration::from_secs(30)));
        assert_eq!(calculate_backoff(1, &err, &settings), Duration::from_secs(30));

        let err = anyhow::Error::new(RetryAfterError::new("wait", Duration::from_secs(600)));
        assert_eq!(
            calculate_backoff(1, &err, &settings),
            settings.max_backoff
        );
    }

    #[test]
    fn backoff_is_exponential_with_bounded_jitter() {
        let settings = RetrySettings {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            backoff_factor: 2.0,
            ..RetrySettings::default()
        };
        let err = anyhow!("rate limit");

        let b1 = calculate_backoff(1, &err, &settings).as_secs_f64();
        assert!((0.75..=1.25).contains(&b1), "b1={b1}");

        let b2 = calculate_backoff(2, &err, &settings).as_secs_f64();
        assert!((1.5..=2.5).contains(&b2), "b2={b2}");

        // Clamped to max_backoff for large attempt numbers.
        let b_big = calculate_backoff(20, &err, &settings);
        assert!(b_big <= settings.max_backoff);
    }

    #[test]
    fn retry_exhausted_display_names_attempts_and_original() {
        let wrapped = RetryExhausted {
            original: anyhow!("rate limit exceeded"),
            attempts: 2,
            elapsed: Duration::from_millis(1500),
        };
        let msg = wrapped.to_string();
        assert!(msg.contains("max retries (2) exhausted"));
        assert!(msg.contains("rate limit exceeded"));
    }
}
