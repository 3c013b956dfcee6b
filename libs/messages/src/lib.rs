//! # ccd-messages
//!
//! Wire types exchanged with the declarative scheduler over the message bus.
//!
//! ## Subjects
//!
//! - `staging.start` carries a [`StageRequestMessage`]
//! - `desired.app.state` carries a [`DesireAppMessage`]
//! - `staging.finished` carries a [`StagingCompletion`] back to the dispatcher
//!
//! Every payload travels inside a [`MessageEnvelope`] that records the
//! message id, the subject, when it was published and, for staging traffic,
//! the staging task id used to correlate a completion with its request.
//!
//! Publishing is fire-and-forget: there is no reply subject and no
//! acknowledgement.

mod envelope;
mod error;
mod types;

pub use envelope::*;
pub use error::MessageError;
pub use types::*;
