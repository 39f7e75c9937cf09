//! Retry Executor: bounded exponential backoff against a single provider.

use crate::error::RouterError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Backoff parameters. Defaults: 3 retries, 1s initial delay, 30s cap, 2x multiplier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

/// A caller-owned cancellation flag, checked at every suspension point: the initial call,
/// each inter-attempt sleep, and each fallback transition.
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: std::sync::Arc<tokio::sync::Notify>,
    cancelled: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: std::sync::Arc::new(tokio::sync::Notify::new()),
            cancelled: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, std::sync::atomic::Ordering::SeqCst);
        self.inner.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Resolves as soon as the token is cancelled; resolves immediately if already cancelled.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.inner.notified().await;
    }

    /// Sleep for `duration` unless cancelled first. Returns `false` if the sleep was cut
    /// short by cancellation.
    async fn sleep_or_cancel(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.cancelled() => false,
        }
    }
}

/// Run `attempt` up to `config.max_retries` additional times, retrying only errors whose
/// code is in the default retryable set. Non-retryable errors propagate immediately; on
/// exhaustion the last error is returned unchanged.
pub async fn execute<F, Fut, T>(
    provider: &str,
    config: &RetryConfig,
    cancel: &CancelToken,
    mut attempt: F,
) -> Result<T, RouterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RouterError>>,
{
    let mut delay_ms = config.initial_delay_ms;
    let mut tries = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(RouterError::new(
                crate::error::ErrorCode::UnknownError,
                provider,
                "request cancelled",
            ));
        }

        match attempt().await {
            Ok(value) => {
                if tries > 0 {
                    debug!(provider, tries, "retry succeeded");
                }
                return Ok(value);
            }
            Err(err) => {
                if !err.retryable || tries >= config.max_retries {
                    return Err(err);
                }

                debug!(
                    provider,
                    attempt = tries + 1,
                    delay_ms,
                    code = %err.code,
                    "retryable error, backing off"
                );

                let completed = cancel
                    .sleep_or_cancel(Duration::from_millis(delay_ms))
                    .await;
                if !completed {
                    return Err(RouterError::new(
                        crate::error::ErrorCode::UnknownError,
                        provider,
                        "request cancelled during backoff",
                    ));
                }

                delay_ms = ((delay_ms as f64) * config.multiplier).min(config.max_delay_ms as f64) as u64;
                tries += 1;
            }
        }
    }
}
