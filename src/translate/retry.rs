use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Exponential backoff for rate-limited translation requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Backoff {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl Backoff {
    pub fn should_retry(&self, attempt: usize, status: StatusCode, body: &str) -> bool {
        attempt < self.max_attempts && is_rate_limited(status, body)
    }

    /// Sleeps for `delay`, or longer if the server asked for it, and returns
    /// the delay to use next time.
    pub async fn wait(&self, attempt: usize, delay: Duration, retry_after: Option<Duration>) -> Duration {
        let wait = match retry_after {
            Some(requested) if requested > delay => requested,
            _ => delay,
        };
        warn!(
            "translation rate limited; retrying in {:.1}s (attempt {}/{})",
            wait.as_secs_f32(),
            attempt,
            self.max_attempts
        );
        sleep(wait).await;
        self.next_delay(delay)
    }

    pub fn next_delay(&self, current: Duration) -> Duration {
        current
            .saturating_mul(2)
            .max(self.base_delay)
            .min(self.max_delay)
    }
}

pub(crate) fn is_rate_limited(status: StatusCode, body: &str) -> bool {
    if matches!(status.as_u16(), 429 | 503 | 529) {
        return true;
    }
    let lower = body.to_lowercase();
    ["rate limit", "rate_limit", "too many requests", "resource_exhausted", "quota", "overloaded"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Only the delta-seconds form of `Retry-After` is honored.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?.trim();
    value.parse::<u64>().ok().map(Duration::from_secs)
}
