//! Message envelope - the common wrapper for every bus payload.

use ccd_id::{AppId, MessageId, StagingTaskId};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::MessageError;

/// Common metadata carried with every published payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope<P> {
    /// Unique id of this publish.
    pub message_id: MessageId,

    /// Subject the message was published on.
    pub subject: String,

    /// When the message was built.
    pub published_at: DateTime<Utc>,

    /// Application the payload concerns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<AppId>,

    /// Staging attempt this message belongs to (staging traffic only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<StagingTaskId>,

    /// Subject-specific payload.
    pub payload: P,
}

impl<P> MessageEnvelope<P> {
    /// Creates a new envelope builder.
    pub fn builder() -> MessageEnvelopeBuilder<P> {
        MessageEnvelopeBuilder::new()
    }
}

impl<P: Serialize> MessageEnvelope<P> {
    /// Serializes the envelope into the bytes handed to the bus.
    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl<P: DeserializeOwned> MessageEnvelope<P> {
    /// Decodes bytes received on `expected_subject`.
    pub fn decode(bytes: &[u8], expected_subject: &'static str) -> Result<Self, MessageError> {
        let envelope: Self = serde_json::from_slice(bytes)?;
        if envelope.subject != expected_subject {
            return Err(MessageError::UnexpectedSubject {
                expected: expected_subject,
                actual: envelope.subject,
            });
        }
        Ok(envelope)
    }
}

/// Builder for constructing message envelopes.
#[derive(Debug)]
pub struct MessageEnvelopeBuilder<P> {
    message_id: Option<MessageId>,
    subject: Option<String>,
    published_at: Option<DateTime<Utc>>,
    app_id: Option<AppId>,
    task_id: Option<StagingTaskId>,
    payload: Option<P>,
}

impl<P> MessageEnvelopeBuilder<P> {
    pub fn new() -> Self {
        Self {
            message_id: None,
            subject: None,
            published_at: None,
            app_id: None,
            task_id: None,
            payload: None,
        }
    }

    pub fn message_id(mut self, id: MessageId) -> Self {
        self.message_id = Some(id);
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn published_at(mut self, ts: DateTime<Utc>) -> Self {
        self.published_at = Some(ts);
        self
    }

    pub fn app_id(mut self, app_id: AppId) -> Self {
        self.app_id = Some(app_id);
        self
    }

    pub fn task_id(mut self, task_id: StagingTaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn payload(mut self, payload: P) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Builds the envelope. A message id and timestamp are generated when
    /// not supplied; subject and payload are required.
    pub fn build(self) -> Result<MessageEnvelope<P>, MessageError> {
        let subject = self
            .subject
            .ok_or_else(|| MessageError::InvalidPayload("subject is required".to_string()))?;
        let payload = self
            .payload
            .ok_or_else(|| MessageError::InvalidPayload("payload is required".to_string()))?;

        Ok(MessageEnvelope {
            message_id: self.message_id.unwrap_or_default(),
            subject,
            published_at: self.published_at.unwrap_or_else(Utc::now),
            app_id: self.app_id,
            task_id: self.task_id,
            payload,
        })
    }
}

impl<P> Default for MessageEnvelopeBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}
