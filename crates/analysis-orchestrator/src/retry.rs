use async_trait::async_trait;
use llm_client::ProviderError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a provider failure should be treated by the cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Throttled; back off and eventually move to another model
    RateLimited,
    /// Network trouble, timeout, empty body, 5xx: back off and retry
    Transient,
    /// Misconfiguration or rejected credentials: retrying cannot help
    Unavailable,
}

/// Retry budget and backoff schedule for a single provider target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts per target; `0` still makes one attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Cap applied to each individual wait
    pub max_delay: Duration,
    /// Failed attempts on a target after which a same-family fallback tier takes over
    pub promote_after: u32,
    /// Promote on any failure, not only on rate limits
    pub promote_on_any_failure: bool,
    /// Bound on one provider call, independent of the retry budget
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(5), Duration::from_secs(60))
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            promote_after: max_retries / 2,
            promote_on_any_failure: false,
            call_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_promote_after(mut self, promote_after: u32) -> Self {
        self.promote_after = promote_after;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Attempts a single target gets before the cascade moves on
    pub fn attempts_per_target(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-based):
    /// `min(max_delay, base_delay * 2^(attempt-1))`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exp;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Whether a failure of `kind` after `attempts_on_target` failed attempts
    /// should hand over to the next same-family tier
    pub fn should_promote(&self, kind: FailureKind, attempts_on_target: u32) -> bool {
        let eligible = kind == FailureKind::RateLimited
            || (self.promote_on_any_failure && kind == FailureKind::Transient);
        eligible && attempts_on_target >= self.promote_after
    }

    /// Classify by status code and message text only
    pub fn classify(error: &ProviderError) -> FailureKind {
        match error {
            ProviderError::Unavailable(_) => return FailureKind::Unavailable,
            ProviderError::Timeout(_) | ProviderError::EmptyResponse(_) => {
                return FailureKind::Transient
            }
            _ => {}
        }

        match error.status() {
            Some(429) => return FailureKind::RateLimited,
            Some(401) | Some(403) => return FailureKind::Unavailable,
            _ => {}
        }

        let text = error.to_string().to_lowercase();
        // "rate" alone would also match "generate"
        if text.contains("429")
            || text.contains("rate limit")
            || text.contains("rate_limit")
            || text.contains("ratelimit")
            || text.contains("too many requests")
            || text.contains("quota")
            || text.contains("resource exhausted")
            || text.contains("resource_exhausted")
        {
            FailureKind::RateLimited
        } else {
            FailureKind::Transient
        }
    }
}

/// Source of backoff waits, swappable in tests
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real waits on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(5, Duration::from_secs(5), Duration::from_secs(60))
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let p = policy();
        let delays: Vec<u64> = (1..=6).map(|i| p.backoff(i).as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 60, 60]);
    }

    #[test]
    fn test_backoff_is_monotonic_and_capped() {
        let p = RetryPolicy::new(3, Duration::from_millis(300), Duration::from_secs(7));
        let mut prev = Duration::ZERO;
        for i in 1..200 {
            let d = p.backoff(i);
            let expected = Duration::from_millis(300)
                .checked_mul(2u32.saturating_pow(i - 1))
                .unwrap_or(Duration::MAX)
                .min(Duration::from_secs(7));
            assert_eq!(d, expected, "attempt {}", i);
            assert!(d >= prev);
            prev = d;
        }
        assert_eq!(prev, Duration::from_secs(7));
    }

    #[test]
    fn test_classify_rate_limits() {
        let e = ProviderError::Status {
            status: 429,
            message: "Too Many Requests".into(),
        };
        assert_eq!(RetryPolicy::classify(&e), FailureKind::RateLimited);

        let e = ProviderError::Request("Quota exceeded for metric generate_content".into());
        assert_eq!(RetryPolicy::classify(&e), FailureKind::RateLimited);

        let e = ProviderError::Status {
            status: 400,
            message: "RESOURCE_EXHAUSTED".into(),
        };
        assert_eq!(RetryPolicy::classify(&e), FailureKind::RateLimited);
    }

    #[test]
    fn test_classify_transient_and_unavailable() {
        assert_eq!(
            RetryPolicy::classify(&ProviderError::Timeout(Duration::from_secs(120))),
            FailureKind::Transient
        );
        assert_eq!(
            RetryPolicy::classify(&ProviderError::EmptyResponse("gemini".into())),
            FailureKind::Transient
        );
        let e = ProviderError::Status {
            status: 503,
            message: "overloaded".into(),
        };
        assert_eq!(RetryPolicy::classify(&e), FailureKind::Transient);
        let e = ProviderError::Request("connection reset while generating content".into());
        assert_eq!(RetryPolicy::classify(&e), FailureKind::Transient);
        let e = ProviderError::Status {
            status: 401,
            message: "invalid key".into(),
        };
        assert_eq!(RetryPolicy::classify(&e), FailureKind::Unavailable);
        assert_eq!(
            RetryPolicy::classify(&ProviderError::Unavailable("no key".into())),
            FailureKind::Unavailable
        );
    }

    #[test]
    fn test_promotion_threshold() {
        let p = policy();
        assert_eq!(p.promote_after, 2);
        assert!(!p.should_promote(FailureKind::RateLimited, 1));
        assert!(p.should_promote(FailureKind::RateLimited, 2));
        assert!(!p.should_promote(FailureKind::Transient, 4));

        let p = RetryPolicy {
            promote_on_any_failure: true,
            ..policy()
        };
        assert!(p.should_promote(FailureKind::Transient, 2));
        assert!(!p.should_promote(FailureKind::Unavailable, 2));
    }

    #[test]
    fn test_zero_retries_still_attempts_once() {
        let p = RetryPolicy::new(0, Duration::from_secs(1), Duration::from_secs(1));
        assert_eq!(p.attempts_per_target(), 1);
        assert!(p.should_promote(FailureKind::RateLimited, 1));
    }
}
