//! Integration tests for the staging round trip on the declarative scheduler.
//!
//! A stage request goes out on `staging.start`, the completion comes back on
//! `staging.finished` and is applied by the completion worker.

use std::sync::Arc;
use std::time::Duration;

use ccd_dispatcher::app::{AppState, Application, PackageState, StagingFailureReason};
use ccd_dispatcher::backend::MockLegacyScheduler;
use ccd_dispatcher::buildpacks::{AdminBuildpack, InternalUrlGenerator, StaticBuildpackCatalog};
use ccd_dispatcher::bus::{BusMessage, InMemoryBus, MessageBus};
use ccd_dispatcher::config::{DiegoMode, DispatchConfig};
use ccd_dispatcher::repository::{AppRepository, InMemoryAppRepository};
use ccd_dispatcher::staging::{CompletionOutcome, CompletionWorker};
use ccd_dispatcher::{Backends, DispatchError};
use ccd_id::{AppId, StagingTaskId};
use ccd_messages::{
    subjects, DesireAppMessage, MessageEnvelope, StageRequestMessage, StagingCompletion,
};
use tokio::sync::watch;

struct Harness {
    bus: InMemoryBus,
    repository: Arc<InMemoryAppRepository>,
    backends: Arc<Backends>,
}

impl Harness {
    fn new() -> Self {
        let config = DispatchConfig {
            staging: DiegoMode::Optional,
            running: DiegoMode::Optional,
            ..DispatchConfig::default()
        };
        let bus = InMemoryBus::default();
        let repository = Arc::new(InMemoryAppRepository::new());
        let backends = Arc::new(Backends::new(
            Arc::new(config),
            Arc::new(bus.clone()),
            repository.clone(),
            Arc::new(MockLegacyScheduler::new()),
            Arc::new(StaticBuildpackCatalog::new(vec![AdminBuildpack::new(
                "ruby", "ruby-key", 1,
            )])),
            Arc::new(InternalUrlGenerator::new("http://cc.internal")),
        ));
        Self {
            bus,
            repository,
            backends,
        }
    }

    fn worker(&self) -> CompletionWorker {
        CompletionWorker::new(
            self.bus.subscribe(subjects::STAGING_FINISHED),
            self.backends.clone(),
            self.repository.clone(),
        )
    }

    async fn diego_app(&self) -> Application {
        let mut app = Application::new("web");
        app.package_hash = Some("abc123".to_string());
        app.stage_with_diego = true;
        app.run_with_diego = true;
        app.state = AppState::Started;
        self.repository.insert(app.clone()).await;
        app
    }

    async fn stage(&self, app: &Application) -> StagingTaskId {
        self.backends.validate_app_for_staging(app).unwrap();
        let backend = self.backends.find_one_to_stage(app).unwrap();
        backend.stage().await.unwrap();
        self.repository
            .get(app.id)
            .await
            .and_then(|a| a.staging_task_id)
            .expect("staging task recorded")
    }
}

fn completion_message(completion: StagingCompletion) -> BusMessage {
    let envelope = MessageEnvelope::builder()
        .subject(subjects::STAGING_FINISHED)
        .app_id(completion.app_id)
        .task_id(completion.task_id)
        .payload(completion)
        .build()
        .unwrap();
    BusMessage {
        subject: subjects::STAGING_FINISHED.to_string(),
        payload: envelope.encode().unwrap(),
    }
}

fn success(app_id: AppId, task_id: StagingTaskId) -> StagingCompletion {
    let mut completion = StagingCompletion::succeeded(
        app_id,
        task_id,
        Some("ruby 1.6.7".to_string()),
        Some("bundle exec rackup".to_string()),
    );
    completion.buildpack_key = Some("ruby-key".to_string());
    completion
}

#[tokio::test]
async fn test_round_trip_through_worker() {
    let harness = Harness::new();
    let app = harness.diego_app().await;
    let mut stage_requests = harness.bus.subscribe(subjects::STAGING_START);
    let mut desires = harness.bus.subscribe(subjects::DESIRE_APP);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(harness.worker().run(shutdown_rx));

    let task_id = harness.stage(&app).await;

    let request = stage_requests.next().await.unwrap();
    let request: MessageEnvelope<StageRequestMessage> =
        MessageEnvelope::decode(&request.payload, subjects::STAGING_START).unwrap();
    assert_eq!(request.payload.task_id, task_id);
    assert_eq!(request.payload.buildpack.unwrap().buildpacks[0].name, "ruby");

    let completion = success(app.id, request.payload.task_id);
    let message = completion_message(completion);
    harness
        .bus
        .publish(&message.subject, message.payload)
        .await
        .unwrap();

    let desire = tokio::time::timeout(Duration::from_secs(5), desires.next())
        .await
        .expect("desire published")
        .unwrap();
    let desire: MessageEnvelope<DesireAppMessage> =
        MessageEnvelope::decode(&desire.payload, subjects::DESIRE_APP).unwrap();
    assert_eq!(desire.payload.num_instances, 1);
    assert_eq!(
        desire.payload.start_command.as_deref(),
        Some("bundle exec rackup")
    );

    let stored = harness.repository.get(app.id).await.unwrap();
    assert_eq!(stored.package_state, PackageState::Staged);
    assert_eq!(stored.detected_buildpack.as_deref(), Some("ruby 1.6.7"));

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), worker)
        .await
        .expect("worker stops")
        .unwrap();
}

#[tokio::test]
async fn test_stale_completion_leaves_state_unchanged() {
    let harness = Harness::new();
    let app = harness.diego_app().await;
    let worker = harness.worker();

    let stale = harness.stage(&app).await;
    let current = harness.stage(&app).await;
    assert_ne!(stale, current);
    let before = harness.repository.get(app.id).await.unwrap();

    let outcome = worker
        .handle_message(&completion_message(success(app.id, stale)))
        .await
        .unwrap();
    assert_eq!(outcome, CompletionOutcome::Superseded);

    let failed = StagingCompletion::failed(app.id, stale, "NoAppDetectedError", "none");
    let outcome = worker
        .handle_message(&completion_message(failed))
        .await
        .unwrap();
    assert_eq!(outcome, CompletionOutcome::Superseded);

    assert_eq!(harness.repository.get(app.id).await.unwrap(), before);
}

#[tokio::test]
async fn test_duplicate_success_is_idempotent() {
    let harness = Harness::new();
    let app = harness.diego_app().await;
    let worker = harness.worker();
    let task_id = harness.stage(&app).await;
    let message = completion_message(success(app.id, task_id));

    assert_eq!(
        worker.handle_message(&message).await.unwrap(),
        CompletionOutcome::Staged
    );
    let once = harness.repository.get(app.id).await.unwrap();

    assert_eq!(
        worker.handle_message(&message).await.unwrap(),
        CompletionOutcome::Staged
    );
    let twice = harness.repository.get(app.id).await.unwrap();

    assert_eq!(once, twice);
    assert!(twice.is_staged());
    assert_eq!(twice.detected_start_command.as_deref(), Some("bundle exec rackup"));
}

#[tokio::test]
async fn test_failed_completion_recorded() {
    let harness = Harness::new();
    let app = harness.diego_app().await;
    let worker = harness.worker();
    let task_id = harness.stage(&app).await;

    let failed = StagingCompletion::failed(app.id, task_id, "BuildpackReleaseFailed", "bad release");
    let outcome = worker
        .handle_message(&completion_message(failed))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CompletionOutcome::Failed(StagingFailureReason::BuildpackReleaseFailed)
    );

    let stored = harness.repository.find(app.id).await.unwrap().unwrap();
    assert!(stored.staging_failed());
    assert_eq!(
        stored.staging_failed_reason,
        Some(StagingFailureReason::BuildpackReleaseFailed)
    );
}

#[tokio::test]
async fn test_completion_for_deleted_app_is_not_found() {
    let harness = Harness::new();
    let app = harness.diego_app().await;
    let worker = harness.worker();
    let task_id = harness.stage(&app).await;
    harness.repository.remove(app.id).await;

    let err = worker
        .handle_message(&completion_message(success(app.id, task_id)))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::AppNotFound(id) if id == app.id));
}

#[tokio::test]
async fn test_malformed_completion_rejected() {
    let harness = Harness::new();
    let worker = harness.worker();
    let message = BusMessage {
        subject: subjects::STAGING_FINISHED.to_string(),
        payload: b"{}".to_vec(),
    };

    let err = worker.handle_message(&message).await.unwrap_err();
    assert!(matches!(err, DispatchError::Message(_)));
}
