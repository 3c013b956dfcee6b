//! Error types for message encoding.

use thiserror::Error;

/// Errors that can occur when encoding or decoding bus messages.
#[derive(Debug, Error, Clone)]
pub enum MessageError {
    /// The envelope was published on a subject the consumer does not handle.
    #[error("unexpected subject: expected '{expected}', got '{actual}'")]
    UnexpectedSubject {
        expected: &'static str,
        actual: String,
    },

    /// The payload is structurally valid JSON but semantically invalid.
    #[error("invalid message payload: {0}")]
    InvalidPayload(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for MessageError {
    fn from(err: serde_json::Error) -> Self {
        MessageError::Serialization(err.to_string())
    }
}
