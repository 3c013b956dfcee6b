//! Message bus client seam.
//!
//! The dispatcher only ever publishes: there is no request/reply and no
//! acknowledgement. Consumers (the stager's completion notifications) arrive
//! through a [`Subscription`] on the in-process bus, or through whatever
//! delivery mechanism a production bus client provides.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Errors returned by the bus client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The bus could not be reached.
    #[error("bus unreachable: {0}")]
    Unreachable(String),

    /// The bus client has been shut down.
    #[error("bus closed")]
    Closed,
}

impl BusError {
    /// Returns true if a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BusError::Unreachable(_))
    }
}

/// A raw message as it travels on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub subject: String,
    pub payload: Vec<u8>,
}

/// Publish-only bus client.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish `payload` on `subject` and return without waiting for any
    /// consumer.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError>;
}

// =============================================================================
// In-process bus
// =============================================================================

/// Default number of messages a slow subscriber may fall behind by.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Broadcast bus for a single process.
#[derive(Clone)]
pub struct InMemoryBus {
    sender: broadcast::Sender<BusMessage>,
}

impl InMemoryBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to every message published on `subject` from now on.
    pub fn subscribe(&self, subject: impl Into<String>) -> Subscription {
        Subscription {
            subject: subject.into(),
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let message = BusMessage {
            subject: subject.to_string(),
            payload,
        };
        // No subscribers is not an error on a fire-and-forget bus.
        if self.sender.send(message).is_err() {
            debug!(subject, "Published with no subscribers");
        }
        Ok(())
    }
}

/// Receiving end for one subject on an [`InMemoryBus`].
pub struct Subscription {
    subject: String,
    receiver: broadcast::Receiver<BusMessage>,
}

impl Subscription {
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Wait for the next message on this subject; `None` once the bus is gone.
    pub async fn next(&mut self) -> Option<BusMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) if message.subject == self.subject => return Some(message),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(subject = %self.subject, skipped, "Subscriber lagged; messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// =============================================================================
// Recording bus
// =============================================================================

/// Bus that records every publish, for tests and dry runs.
#[derive(Default)]
pub struct RecordingBus {
    published: Mutex<Vec<BusMessage>>,
    failures_remaining: AtomicU32,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus that is never reachable.
    pub fn failing() -> Self {
        Self::failing_times(u32::MAX)
    }

    /// A bus that is unreachable for the first `times` publishes.
    pub fn failing_times(times: u32) -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            failures_remaining: AtomicU32::new(times),
        }
    }

    /// Every message published so far, in order.
    pub fn published(&self) -> Vec<BusMessage> {
        self.published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Messages published on `subject`, in order.
    pub fn published_on(&self, subject: &str) -> Vec<BusMessage> {
        self.published()
            .into_iter()
            .filter(|m| m.subject == subject)
            .collect()
    }

    pub fn publish_count(&self) -> usize {
        self.published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[async_trait]
impl MessageBus for RecordingBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(BusError::Unreachable(format!(
                "recording bus configured to fail publish on {subject}"
            )));
        }

        self.published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(BusMessage {
                subject: subject.to_string(),
                payload,
            });
        Ok(())
    }
}

// =============================================================================
// Bounded retry
// =============================================================================

/// Exponential backoff configuration.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base: Duration,

    /// Maximum delay.
    pub max: Duration,

    /// Jitter factor (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(50),
            max: Duration::from_secs(2),
            jitter: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.min(30) as i32;
        let delay = self.base.as_millis() as f64 * 2.0_f64.powi(exp);
        let delay = delay.min(self.max.as_millis() as f64);

        let jitter_range = delay * self.jitter.clamp(0.0, 1.0);
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;

        Duration::from_millis((delay + jitter).max(0.0) as u64)
    }
}

/// Bus decorator that retries unreachable-bus failures a bounded number of
/// times before surfacing the last error.
pub struct RetryingBus<B> {
    inner: B,
    max_attempts: u32,
    backoff: BackoffPolicy,
}

impl<B: MessageBus> RetryingBus<B> {
    pub fn new(inner: B, max_attempts: u32, backoff: BackoffPolicy) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }
}

#[async_trait]
impl<B: MessageBus> MessageBus for RetryingBus<B> {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let mut attempt = 0;
        loop {
            match self.inner.publish(subject, payload.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt + 1 < self.max_attempts => {
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        subject,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Publish failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
