//! Staging completion handling for the declarative scheduler.
//!
//! Completions arrive out of band, possibly late, duplicated or out of order.
//! A completion is applied only when its task id is the app's current
//! staging attempt; anything else is dropped without touching the record.

mod completion;
mod worker;

pub use completion::StagingCompletionHandler;
pub use worker::CompletionWorker;

use async_trait::async_trait;
use ccd_messages::StagingCompletion;

use crate::app::StagingFailureReason;
use crate::error::DispatchResult;
use crate::protocol::ProtocolKind;

/// What applying a completion did to the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// The package is staged and the desired state was published.
    Staged,
    /// The package is marked failed with this reason.
    Failed(StagingFailureReason),
    /// The completion belongs to an attempt that is no longer current.
    Superseded,
}

/// Applies staging completions for one protocol variant.
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    fn kind(&self) -> ProtocolKind;

    async fn staging_complete(
        &self,
        completion: &StagingCompletion,
    ) -> DispatchResult<CompletionOutcome>;
}
