//! Consumes staging completions from the bus.

use std::sync::Arc;

use ccd_messages::{subjects, MessageEnvelope, StagingCompletion};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use super::CompletionOutcome;
use crate::backend::Backend;
use crate::backends::Backends;
use crate::bus::{BusMessage, Subscription};
use crate::error::{DispatchError, DispatchResult};
use crate::repository::AppRepository;

/// Applies every completion published on `staging.finished`.
///
/// Failures are logged per message and never stop the loop.
pub struct CompletionWorker {
    subscription: Subscription,
    backends: Arc<Backends>,
    repository: Arc<dyn AppRepository>,
}

impl CompletionWorker {
    pub fn new(
        subscription: Subscription,
        backends: Arc<Backends>,
        repository: Arc<dyn AppRepository>,
    ) -> Self {
        Self {
            subscription,
            backends,
            repository,
        }
    }

    #[instrument(skip(self, shutdown), fields(subject = %self.subscription.subject()))]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting staging completion worker");

        loop {
            tokio::select! {
                message = self.subscription.next() => {
                    let Some(message) = message else {
                        warn!("Bus closed; completion worker stopping");
                        break;
                    };
                    match self.handle_message(&message).await {
                        Ok(outcome) => debug!(outcome = ?outcome, "Completion handled"),
                        Err(e) => error!(error = %e, code = e.code(), "Failed to handle staging completion"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Completion worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Decode one bus message and hand it to the app's declarative backend.
    pub async fn handle_message(&self, message: &BusMessage) -> DispatchResult<CompletionOutcome> {
        let envelope: MessageEnvelope<StagingCompletion> =
            MessageEnvelope::decode(&message.payload, subjects::STAGING_FINISHED)?;
        let completion = envelope.payload;

        let app = self
            .repository
            .find(completion.app_id)
            .await?
            .ok_or(DispatchError::AppNotFound(completion.app_id))?;

        self.backends
            .diego_backend(&app)
            .staging_complete(&completion)
            .await
    }
}
