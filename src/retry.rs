//! Retry policy for critical submissions
//!
//! Bounded-retry wrapper over the submission seam with exponential backoff.
//! This is the only place in the crate allowed to sleep; cancellation happens
//! by dropping the future between attempts.

use crate::config::CommsConfig;
use crate::domain_types::{MaxRetries, OutgoingMessage, RetryBackoffMs};
use crate::traits::MessageSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retries rejected submissions with exponential backoff.
pub struct RetryPolicy {
    sink: Arc<dyn MessageSink>,
    default_max_retries: MaxRetries,
    backoff_base: RetryBackoffMs,
}

impl RetryPolicy {
    /// Creates a policy over a sink with the configuration's retry bound and
    /// backoff base.
    #[must_use]
    pub fn new(sink: Arc<dyn MessageSink>, config: &CommsConfig) -> Self {
        Self {
            sink,
            default_max_retries: config.max_retries,
            backoff_base: config.retry_backoff_base,
        }
    }

    /// Creates a policy with explicit bounds.
    #[must_use]
    pub fn with_bounds(
        sink: Arc<dyn MessageSink>,
        max_retries: MaxRetries,
        backoff_base: RetryBackoffMs,
    ) -> Self {
        Self {
            sink,
            default_max_retries: max_retries,
            backoff_base,
        }
    }

    /// Submits with up to `max_retries` retries: attempts `0..=max_retries`,
    /// sleeping `base * 2^attempt` between attempts (no trailing sleep).
    ///
    /// Returns `true` as soon as one submission is accepted.
    pub async fn send_with_retry(&self, message: OutgoingMessage, max_retries: u8) -> bool {
        for attempt in 0..=max_retries {
            if self.sink.submit(message.clone()).await {
                if attempt > 0 {
                    debug!(
                        message_id = %message.message.id,
                        attempt,
                        "submission accepted after retry"
                    );
                }
                return true;
            }
            if attempt < max_retries {
                let delay = self.backoff_delay(attempt);
                debug!(
                    message_id = %message.message.id,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "submission rejected, backing off"
                );
                sleep(delay).await;
            }
        }
        warn!(
            message_id = %message.message.id,
            attempts = u16::from(max_retries) + 1,
            "submission abandoned after exhausting retries"
        );
        false
    }

    /// Submits with the preconfigured default retry bound.
    pub async fn send_critical(&self, message: OutgoingMessage) -> bool {
        self.send_with_retry(message, self.default_max_retries.as_u8())
            .await
    }

    fn backoff_delay(&self, attempt: u8) -> Duration {
        let factor = 2u32.saturating_pow(u32::from(attempt));
        self.backoff_base.as_duration().saturating_mul(factor)
    }
}
