use std::sync::Arc;

use async_trait::async_trait;
use ccd_messages::StagingCompletion;
use tracing::{info, instrument, warn};

use super::{CompletionHandler, CompletionOutcome};
use crate::app::{Application, StagingFailureReason};
use crate::error::{DispatchError, DispatchResult};
use crate::messenger::Messenger;
use crate::protocol::ProtocolKind;
use crate::repository::{AppRepository, StagingResult, TransitionOutcome};

/// Records staging outcomes and kicks off running on success.
pub struct StagingCompletionHandler {
    kind: ProtocolKind,
    repository: Arc<dyn AppRepository>,
    messenger: Messenger,
}

impl StagingCompletionHandler {
    pub fn new(kind: ProtocolKind, repository: Arc<dyn AppRepository>, messenger: Messenger) -> Self {
        Self {
            kind,
            repository,
            messenger,
        }
    }

    fn staging_result(&self, completion: &StagingCompletion) -> StagingResult {
        match self.kind {
            // Images have no buildpack; only the start command is meaningful.
            ProtocolKind::Docker => StagingResult {
                detected_buildpack: None,
                buildpack_key: None,
                detected_start_command: completion.detected_start_command.clone(),
            },
            ProtocolKind::Traditional => StagingResult {
                detected_buildpack: completion.detected_buildpack.clone(),
                buildpack_key: completion.buildpack_key.clone(),
                detected_start_command: completion.detected_start_command.clone(),
            },
        }
    }

    async fn handle_success(
        &self,
        app: &Application,
        completion: &StagingCompletion,
    ) -> DispatchResult<CompletionOutcome> {
        let result = self.staging_result(completion);
        match self
            .repository
            .mark_as_staged(app.id, completion.task_id, &result)
            .await?
        {
            TransitionOutcome::Applied(staged) => {
                info!(
                    detected_buildpack = ?staged.detected_buildpack,
                    "Staging succeeded"
                );
                self.messenger.send_desire_request(&staged).await?;
                Ok(CompletionOutcome::Staged)
            }
            TransitionOutcome::Superseded { current } => {
                info!(current = ?current, "Staging completion superseded during write");
                Ok(CompletionOutcome::Superseded)
            }
        }
    }

    async fn handle_failure(
        &self,
        app: &Application,
        completion: &StagingCompletion,
        reason_id: &str,
        message: &str,
    ) -> DispatchResult<CompletionOutcome> {
        let reason = StagingFailureReason::classify(reason_id);
        match self
            .repository
            .mark_as_failed_to_stage(app.id, completion.task_id, reason)
            .await?
        {
            TransitionOutcome::Applied(_) => {
                info!(reason = %reason, detail = message, "Staging failed");
                Ok(CompletionOutcome::Failed(reason))
            }
            TransitionOutcome::Superseded { current } => {
                info!(current = ?current, "Staging completion superseded during write");
                Ok(CompletionOutcome::Superseded)
            }
        }
    }
}

#[async_trait]
impl CompletionHandler for StagingCompletionHandler {
    fn kind(&self) -> ProtocolKind {
        self.kind
    }

    #[instrument(
        skip(self, completion),
        fields(app_id = %completion.app_id, task_id = %completion.task_id, protocol = %self.kind)
    )]
    async fn staging_complete(
        &self,
        completion: &StagingCompletion,
    ) -> DispatchResult<CompletionOutcome> {
        let app = self
            .repository
            .find(completion.app_id)
            .await?
            .ok_or(DispatchError::AppNotFound(completion.app_id))?;

        if app.staging_task_id != Some(completion.task_id) {
            warn!(
                current = ?app.staging_task_id,
                "Discarding completion for superseded staging attempt"
            );
            return Ok(CompletionOutcome::Superseded);
        }

        match &completion.error {
            None => self.handle_success(&app, completion).await,
            Some(failure) => {
                self.handle_failure(&app, completion, &failure.id, &failure.message)
                    .await
            }
        }
    }
}
