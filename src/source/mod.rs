//! Event sources.
//!
//! - [`ApiSource`] - Polls the YouTube Live Chat Messages API
//! - [`BrowserSource`] - Drives Chromium and drains an injected DOM observer
//!
//! Both reduce what they capture to [`ChatEvent`]s before the session sees
//! them. A source only guarantees capture order and may redeliver messages.

pub mod api;
pub mod browser;
mod js_scripts;

pub use api::{ApiConfig, ApiSource, normalize_video_id};
pub use browser::{BrowserSource, BrowserSourceConfig};

use crate::Result;
use crate::event::ChatEvent;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// A source of chat events, fetched in batches once per poll cycle.
#[allow(async_fn_in_trait)]
pub trait EventSource {
    /// Human-readable name for this source (used in logs).
    fn name(&self) -> &'static str;

    /// Fetch everything captured since the previous call.
    async fn fetch(&mut self) -> Result<Vec<ChatEvent>>;

    /// Called once retries are exhausted. Returns `true` if the source
    /// rebuilt its state and capture can go on.
    async fn reset(&mut self) -> bool {
        false
    }
}

/// Fixed-delay retry for transient fetch failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Fetch from `source`, retrying up to `max_retries` times. The last
    /// error is returned once attempts run out.
    pub async fn fetch<S: EventSource>(&self, source: &mut S) -> Result<Vec<ChatEvent>> {
        let mut attempt = 0;
        loop {
            match source.fetch().await {
                Ok(batch) => return Ok(batch),
                Err(err) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "{} fetch failed (attempt {}/{}): {}",
                        source.name(),
                        attempt,
                        self.max_retries + 1,
                        err
                    );
                    sleep(self.backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    struct Failing {
        failures: u32,
        calls: u32,
    }

    impl EventSource for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn fetch(&mut self) -> Result<Vec<ChatEvent>> {
            self.calls += 1;
            if self.calls <= self.failures {
                Err(Error::Script(format!("boom {}", self.calls)))
            } else {
                Ok(vec![ChatEvent::message("1", "a", "b")])
            }
        }
    }

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn recovers_within_retry_budget() {
        let mut source = Failing { failures: 2, calls: 0 };
        let batch = fast().fetch(&mut source).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(source.calls, 3);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error() {
        let mut source = Failing { failures: 5, calls: 0 };
        let err = fast().fetch(&mut source).await.unwrap_err();
        assert_eq!(source.calls, 3);
        assert!(err.to_string().contains("boom 3"));
        assert!(!source.reset().await);
    }
}
