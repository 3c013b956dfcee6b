use std::sync::Arc;

use async_trait::async_trait;
use ccd_id::StagingTaskId;
use ccd_messages::{DesireAppMessage, StagingCompletion};
use tracing::{info, instrument};

use super::{Backend, BackendKind};
use crate::app::Application;
use crate::error::DispatchResult;
use crate::messenger::Messenger;
use crate::repository::AppRepository;
use crate::staging::{CompletionHandler, CompletionOutcome};

/// Backend for the declarative scheduler.
///
/// Every lifecycle operation other than staging publishes the app's current
/// desired state; the scheduler reconciles the difference itself, so these
/// calls may interleave freely.
pub struct DiegoBackend {
    app: Application,
    messenger: Messenger,
    completion_handler: Arc<dyn CompletionHandler>,
    repository: Arc<dyn AppRepository>,
}

impl DiegoBackend {
    pub fn new(
        app: Application,
        messenger: Messenger,
        completion_handler: Arc<dyn CompletionHandler>,
        repository: Arc<dyn AppRepository>,
    ) -> Self {
        Self {
            app,
            messenger,
            completion_handler,
            repository,
        }
    }

    async fn desire(&self) -> DispatchResult<()> {
        self.messenger.send_desire_request(&self.app).await
    }
}

#[async_trait]
impl Backend for DiegoBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Diego(self.messenger.protocol().kind())
    }

    fn app(&self) -> &Application {
        &self.app
    }

    #[instrument(skip(self), fields(app_id = %self.app.id))]
    async fn stage(&self) -> DispatchResult<()> {
        let task_id = StagingTaskId::new();
        let app = self.repository.begin_staging(self.app.id, task_id).await?;
        info!(task_id = %task_id, "Requesting staging");
        self.messenger.send_stage_request(&app, task_id).await
    }

    async fn start(&self) -> DispatchResult<()> {
        self.desire().await
    }

    async fn stop(&self) -> DispatchResult<()> {
        self.desire().await
    }

    async fn scale(&self) -> DispatchResult<()> {
        self.desire().await
    }

    async fn update_routes(&self) -> DispatchResult<()> {
        self.desire().await
    }

    async fn staging_complete(
        &self,
        completion: &StagingCompletion,
    ) -> DispatchResult<CompletionOutcome> {
        self.completion_handler.staging_complete(completion).await
    }

    fn desire_app_message(&self) -> Option<DesireAppMessage> {
        Some(self.messenger.protocol().desire_app_message(&self.app))
    }
}

#[cfg(test)]
mod tests {
    use ccd_messages::{subjects, MessageEnvelope, StageRequestMessage};

    use super::*;
    use crate::app::{AppState, PackageState};
    use crate::bus::RecordingBus;
    use crate::protocol::{DockerProtocol, ProtocolKind};
    use crate::repository::InMemoryAppRepository;
    use crate::staging::StagingCompletionHandler;

    async fn backend(app: Application) -> (DiegoBackend, Arc<RecordingBus>, Arc<InMemoryAppRepository>) {
        let repository = Arc::new(InMemoryAppRepository::new());
        repository.insert(app.clone()).await;
        let bus = Arc::new(RecordingBus::new());
        let messenger = Messenger::new(bus.clone(), Arc::new(DockerProtocol::default()), 120);
        let handler = Arc::new(StagingCompletionHandler::new(
            ProtocolKind::Docker,
            repository.clone(),
            messenger.clone(),
        ));
        (
            DiegoBackend::new(app, messenger, handler, repository.clone()),
            bus,
            repository,
        )
    }

    fn docker_app() -> Application {
        let mut app = Application::new("worker");
        app.docker_image = Some("busybox".to_string());
        app.package_state = PackageState::Failed;
        app
    }

    #[tokio::test]
    async fn test_stage_records_task_before_publishing() {
        let app = docker_app();
        let (backend, bus, repository) = backend(app.clone()).await;

        backend.stage().await.unwrap();

        let stored = repository.get(app.id).await.unwrap();
        assert!(stored.is_pending());
        let task_id = stored.staging_task_id.expect("task recorded");

        let published = bus.published_on(subjects::STAGING_START);
        assert_eq!(published.len(), 1);
        let envelope: MessageEnvelope<StageRequestMessage> =
            MessageEnvelope::decode(&published[0].payload, subjects::STAGING_START).unwrap();
        assert_eq!(envelope.payload.task_id, task_id);
    }

    #[tokio::test]
    async fn test_restage_supersedes_previous_task() {
        let app = docker_app();
        let (backend, _bus, repository) = backend(app.clone()).await;

        backend.stage().await.unwrap();
        let first = repository.get(app.id).await.unwrap().staging_task_id.unwrap();
        backend.stage().await.unwrap();
        let second = repository.get(app.id).await.unwrap().staging_task_id.unwrap();

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_lifecycle_operations_publish_desired_state() {
        let mut app = docker_app();
        app.state = AppState::Started;
        let (backend, bus, _) = backend(app).await;

        backend.start().await.unwrap();
        backend.scale().await.unwrap();
        backend.update_routes().await.unwrap();
        backend.stop().await.unwrap();

        assert_eq!(bus.published_on(subjects::DESIRE_APP).len(), 4);
        assert!(bus.published_on(subjects::STAGING_START).is_empty());
    }

    #[tokio::test]
    async fn test_kind_and_desire_message() {
        let app = docker_app();
        let (backend, bus, _) = backend(app).await;

        assert_eq!(backend.kind(), BackendKind::Diego(ProtocolKind::Docker));
        let message = backend.desire_app_message().unwrap();
        assert_eq!(message.docker_image.as_deref(), Some("busybox"));
        assert_eq!(bus.publish_count(), 0);
    }
}
