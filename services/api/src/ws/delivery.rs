//! Best-effort delivery of messages over a socket.
//!
//! Both the client socket and the provider socket implement [`Transport`].
//! [`send_json`] and [`send_text`] retry transient failures with exponential
//! backoff and report the outcome as a `bool`. Callers that need the reason
//! for a failed delivery use [`deliver_json`] and [`deliver_text`].

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, warn};

/// Why a single send attempt failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SendError {
    /// The remote side is gone. Retrying cannot help.
    #[error("socket closed: {0}")]
    Closed(String),
    /// The attempt failed but the socket may still be usable.
    #[error("send failed: {0}")]
    Transient(String),
}

/// Why a delivery gave up.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("message could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("socket is not open")]
    NotOpen,
    /// The error of the last attempt.
    #[error(transparent)]
    Send(#[from] SendError),
}

/// The capabilities the delivery layer needs from a socket.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the socket is still believed to be open.
    fn is_open(&self) -> bool;

    /// Makes a single attempt at sending one text frame.
    async fn try_send(&self, text: String) -> Result<(), SendError>;

    /// Closes the socket. Closing an already closed socket is a no-op.
    async fn close(&self);
}

/// Retry settings for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt, so at most `max_retries + 1` attempts.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for every retry after it.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn with_initial_delay(initial_delay: Duration) -> Self {
        Self {
            initial_delay,
            ..Self::default()
        }
    }

    /// Delay after the failed `attempt` (1-based): `initial_delay * 2^(attempt-1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_delay.saturating_mul(1u32 << exponent)
    }
}

/// Serializes `msg` to JSON and delivers it. Returns `true` once an attempt
/// succeeds.
pub async fn send_json<T>(transport: &dyn Transport, msg: &T, policy: RetryPolicy) -> bool
where
    T: Serialize + ?Sized,
{
    deliver_json(transport, msg, policy).await.is_ok()
}

/// Delivers a pre-encoded text frame.
pub async fn send_text(transport: &dyn Transport, text: String, policy: RetryPolicy) -> bool {
    deliver_text(transport, text, policy).await.is_ok()
}

/// Like [`send_json`], but reports why the delivery failed.
pub async fn deliver_json<T>(transport: &dyn Transport, msg: &T, policy: RetryPolicy) -> Result<(), DeliveryError>
where
    T: Serialize + ?Sized,
{
    let text = serde_json::to_string(msg).map_err(|e| {
        // Not retried: the same value will never serialize.
        error!(error = %e, "Failed to serialize outbound message.");
        e
    })?;
    deliver_text(transport, text, policy).await
}

/// Like [`send_text`], but reports why the delivery failed.
pub async fn deliver_text(transport: &dyn Transport, text: String, policy: RetryPolicy) -> Result<(), DeliveryError> {
    let max_attempts = policy.max_retries + 1;
    let mut attempt = 1;
    loop {
        if !transport.is_open() {
            warn!(attempt, "Socket is closed; dropping message.");
            return Err(DeliveryError::NotOpen);
        }

        match transport.try_send(text.clone()).await {
            Ok(()) => return Ok(()),
            Err(SendError::Closed(reason)) => {
                error!(%reason, "Socket closed permanently during send.");
                return Err(SendError::Closed(reason).into());
            }
            Err(SendError::Transient(reason)) => {
                if attempt >= max_attempts {
                    error!(
                        retries = policy.max_retries,
                        %reason,
                        "Failed to send after exhausting retries."
                    );
                    return Err(SendError::Transient(reason).into());
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt,
                    retries = policy.max_retries,
                    ?delay,
                    %reason,
                    "Send failed. Retrying..."
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
