//! Fire-and-forget publishing of scheduler messages.

use std::sync::Arc;

use ccd_id::StagingTaskId;
use ccd_messages::{subjects, MessageEnvelope};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::app::Application;
use crate::bus::MessageBus;
use crate::error::DispatchResult;
use crate::protocol::Protocol;

/// Publishes stage and desire messages built by one protocol variant.
#[derive(Clone)]
pub struct Messenger {
    bus: Arc<dyn MessageBus>,
    protocol: Arc<dyn Protocol>,
    staging_timeout_secs: u64,
}

impl Messenger {
    pub fn new(bus: Arc<dyn MessageBus>, protocol: Arc<dyn Protocol>, staging_timeout_secs: u64) -> Self {
        Self {
            bus,
            protocol,
            staging_timeout_secs,
        }
    }

    pub fn protocol(&self) -> &Arc<dyn Protocol> {
        &self.protocol
    }

    /// Publish a stage request for attempt `task_id` on `staging.start`.
    #[instrument(skip(self, app, task_id), fields(app_id = %app.id, task_id = %task_id))]
    pub async fn send_stage_request(
        &self,
        app: &Application,
        task_id: StagingTaskId,
    ) -> DispatchResult<()> {
        let message = self
            .protocol
            .stage_request_message(app, task_id, self.staging_timeout_secs);
        let envelope = MessageEnvelope::builder()
            .subject(subjects::STAGING_START)
            .app_id(app.id)
            .task_id(task_id)
            .payload(message)
            .build()?;

        self.publish(subjects::STAGING_START, &envelope).await
    }

    /// Publish the app's current desired state on `desired.app.state`.
    #[instrument(skip(self, app), fields(app_id = %app.id))]
    pub async fn send_desire_request(&self, app: &Application) -> DispatchResult<()> {
        let message = self.protocol.desire_app_message(app);
        let envelope = MessageEnvelope::builder()
            .subject(subjects::DESIRE_APP)
            .app_id(app.id)
            .payload(message)
            .build()?;

        self.publish(subjects::DESIRE_APP, &envelope).await
    }

    async fn publish<P: Serialize>(
        &self,
        subject: &str,
        envelope: &MessageEnvelope<P>,
    ) -> DispatchResult<()> {
        let bytes = envelope.encode()?;
        self.bus.publish(subject, bytes).await?;
        debug!(
            subject,
            message_id = %envelope.message_id,
            protocol = %self.protocol.kind(),
            "Published"
        );
        Ok(())
    }
}
