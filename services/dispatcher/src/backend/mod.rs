//! The uniform backend contract.
//!
//! Callers obtain a [`Backend`] from [`crate::backends::Backends`] and never
//! learn which scheduler family they are talking to beyond [`Backend::kind`].

mod diego;
mod legacy;

pub use diego::DiegoBackend;
pub use legacy::{LegacyBackend, LegacyCall, LegacySchedulerClient, MockLegacyScheduler};

use async_trait::async_trait;
use ccd_messages::{DesireAppMessage, StagingCompletion};

use crate::app::Application;
use crate::error::DispatchResult;
use crate::protocol::ProtocolKind;
use crate::staging::CompletionOutcome;

/// Which scheduler family a backend drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Legacy,
    Diego(ProtocolKind),
}

impl BackendKind {
    pub fn is_diego(&self) -> bool {
        matches!(self, BackendKind::Diego(_))
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Legacy => write!(f, "legacy"),
            BackendKind::Diego(protocol) => write!(f, "diego/{}", protocol),
        }
    }
}

/// Operations every scheduler backend exposes for one application.
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// The app this backend was built for.
    fn app(&self) -> &Application;

    /// Trigger a staging attempt.
    async fn stage(&self) -> DispatchResult<()>;

    async fn start(&self) -> DispatchResult<()>;

    async fn stop(&self) -> DispatchResult<()>;

    async fn scale(&self) -> DispatchResult<()>;

    async fn update_routes(&self) -> DispatchResult<()>;

    /// Apply an out-of-band staging completion.
    async fn staging_complete(
        &self,
        completion: &StagingCompletion,
    ) -> DispatchResult<CompletionOutcome>;

    /// The desired-state payload this backend would publish, if it publishes one.
    fn desire_app_message(&self) -> Option<DesireAppMessage>;
}
