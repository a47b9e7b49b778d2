//! Bounded exponential backoff for transient failures.

use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use kidsafe_core::config::RetrySettings;
use kidsafe_core::error::is_transient;
use kidsafe_core::traits::Retriever;
use kidsafe_core::types::{ScoredChunk, StrategyKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self { Self::from(&RetrySettings::default()) }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(s: &RetrySettings) -> Self {
        Self {
            max_attempts: s.max_attempts.max(1),
            initial_backoff: Duration::from_millis(s.initial_backoff_ms),
            max_backoff: Duration::from_millis(s.max_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): doubling, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if is_transient(&e) && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(attempt, error = %e, "{} failed transiently, retrying in {:?}", label, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if attempt > 1 { debug!(attempt, "{} giving up", label); }
                    return Err(e);
                }
            }
        }
    }
}

/// A strategy whose `retrieve` is retried under a [`RetryPolicy`].
pub struct Retrying<R> {
    inner: R,
    policy: RetryPolicy,
}

impl<R: Retriever> Retrying<R> {
    pub fn new(inner: R, policy: RetryPolicy) -> Self { Self { inner, policy } }
}

#[async_trait]
impl<R: Retriever> Retriever for Retrying<R> {
    fn kind(&self) -> StrategyKind { self.inner.kind() }

    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        self.policy.run(self.inner.kind().as_str(), || self.inner.retrieve(query, k)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy { max_attempts: 5, initial_backoff: Duration::from_millis(200), max_backoff: Duration::from_secs(2) };
        assert_eq!(p.backoff(1), Duration::from_millis(200));
        assert_eq!(p.backoff(2), Duration::from_millis(400));
        assert_eq!(p.backoff(3), Duration::from_millis(800));
        assert_eq!(p.backoff(5), Duration::from_secs(2));
        assert_eq!(p.backoff(40), Duration::from_secs(2));
    }

    #[test]
    fn defaults_follow_settings() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts, 3);
        assert_eq!(p.initial_backoff, Duration::from_millis(200));
        assert_eq!(p.max_backoff, Duration::from_millis(2000));
    }
}
