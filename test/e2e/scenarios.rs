//! End-to-end dispatch scenarios.
//!
//! Drives the dispatcher through its public surface with an in-process bus,
//! the in-memory repository and mock scheduler clients:
//!
//! 1. Running on the legacy scheduler never touches the bus
//! 2. Asking for the declarative scheduler while it is disabled fails
//! 3. Docker apps get the docker protocol and an image-only desire message
//! 4. Stopped apps report zero instances without any health query
//! 5. Full flow: validate, stage, complete, run, report
//!
//! ## Running
//!
//! ```bash
//! cargo test -p ccd-e2e --test scenarios
//! ```

use std::sync::Arc;
use std::time::Duration;

use ccd_dispatcher::app::{AppState, Application};
use ccd_dispatcher::backend::{BackendKind, LegacyCall, MockLegacyScheduler};
use ccd_dispatcher::buildpacks::{AdminBuildpack, InternalUrlGenerator, StaticBuildpackCatalog};
use ccd_dispatcher::bus::{InMemoryBus, MessageBus, RecordingBus};
use ccd_dispatcher::config::{DiegoMode, DispatchConfig};
use ccd_dispatcher::instances::{
    DiegoInstancesReporter, InstanceState, InstancesReporters, LegacyInstancesReporter,
    MockHealthManager, MockLrpSource,
};
use ccd_dispatcher::protocol::ProtocolKind;
use ccd_dispatcher::repository::InMemoryAppRepository;
use ccd_dispatcher::staging::CompletionWorker;
use ccd_dispatcher::{Backends, DispatchError};
use ccd_messages::{subjects, MessageEnvelope, StageRequestMessage, StagingCompletion};
use tokio::sync::watch;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("ccd_dispatcher=debug")
        .with_test_writer()
        .try_init();
}

fn config(staging: DiegoMode, running: DiegoMode, diego_docker: bool) -> DispatchConfig {
    DispatchConfig {
        staging,
        running,
        diego_docker,
        ..DispatchConfig::default()
    }
}

fn catalog() -> Arc<StaticBuildpackCatalog> {
    Arc::new(StaticBuildpackCatalog::new(vec![
        AdminBuildpack::new("java", "java-key", 1),
        AdminBuildpack::new("ruby", "ruby-key", 2),
    ]))
}

fn urls() -> Arc<InternalUrlGenerator> {
    Arc::new(InternalUrlGenerator::new("http://cc.internal:9022"))
}

#[tokio::test]
async fn scenario_a_legacy_run_delegates_to_scheduler_client() {
    init_tracing();
    let bus = Arc::new(RecordingBus::new());
    let legacy = Arc::new(MockLegacyScheduler::new());
    let backends = Backends::new(
        Arc::new(config(DiegoMode::Optional, DiegoMode::Optional, false)),
        bus.clone(),
        Arc::new(InMemoryAppRepository::new()),
        legacy.clone(),
        catalog(),
        urls(),
    );

    let mut app = Application::new("legacy-web");
    app.run_with_diego = false;
    app.state = AppState::Started;
    app.instances = 2;

    let backend = backends.find_one_to_run(&app).unwrap();
    assert_eq!(backend.kind(), BackendKind::Legacy);

    backend.start().await.unwrap();

    assert_eq!(
        legacy.calls(),
        vec![LegacyCall::Start {
            app_id: app.id,
            instances: 2
        }]
    );
    assert_eq!(bus.publish_count(), 0);
}

#[tokio::test]
async fn scenario_b_diego_staging_disabled() {
    init_tracing();
    let backends = Backends::new(
        Arc::new(config(DiegoMode::Disabled, DiegoMode::Optional, false)),
        Arc::new(RecordingBus::new()),
        Arc::new(InMemoryAppRepository::new()),
        Arc::new(MockLegacyScheduler::new()),
        catalog(),
        urls(),
    );

    let mut app = Application::new("web");
    app.stage_with_diego = true;

    let err = backends.find_one_to_stage(&app).err().expect("selection fails");
    assert!(matches!(err, DispatchError::DiegoDisabled));
    assert_eq!(err.name(), "DiegoDisabled");
    assert!(err.is_terminal());
}

#[tokio::test]
async fn scenario_c_docker_app_uses_docker_protocol() {
    init_tracing();
    let backends = Backends::new(
        Arc::new(config(DiegoMode::Optional, DiegoMode::Optional, true)),
        Arc::new(RecordingBus::new()),
        Arc::new(InMemoryAppRepository::new()),
        Arc::new(MockLegacyScheduler::new()),
        catalog(),
        urls(),
    );

    let mut app = Application::new("docker-worker");
    app.docker_image = Some("cloudfoundry/diego-docker-app:latest".to_string());
    app.package_hash = Some("docker-hash".to_string());
    app.stage_with_diego = true;
    app.run_with_diego = true;

    backends.validate_app_for_staging(&app).unwrap();
    let backend = backends.find_one_to_stage(&app).unwrap();
    assert_eq!(backend.kind(), BackendKind::Diego(ProtocolKind::Docker));

    let message = backend.desire_app_message().expect("declarative backend");
    assert_eq!(
        message.docker_image.as_deref(),
        Some("cloudfoundry/diego-docker-app:latest")
    );
    assert!(message.droplet_uri.is_none());

    let json = serde_json::to_value(&message).unwrap();
    assert!(json.get("buildpack").is_none());
    assert!(json.get("buildpacks").is_none());
    assert!(json.get("droplet_uri").is_none());
}

#[tokio::test]
async fn scenario_d_stopped_app_reports_zero_without_query() {
    init_tracing();
    let legacy = Arc::new(MockHealthManager::unavailable());
    let diego = Arc::new(MockLrpSource::unavailable());
    let reporters = InstancesReporters::new(
        Arc::new(config(DiegoMode::Optional, DiegoMode::Optional, false)),
        Arc::new(LegacyInstancesReporter::new(legacy.clone(), legacy.clone())),
        Arc::new(DiegoInstancesReporter::new(diego.clone())),
    );

    let app = Application::new("idle");
    assert!(!app.is_started());

    let count = reporters
        .number_of_starting_and_running_instances_for_app(&app)
        .await
        .unwrap();

    assert_eq!(count, 0);
    assert_eq!(legacy.single_calls() + legacy.bulk_calls(), 0);
    assert_eq!(diego.single_calls() + diego.bulk_calls(), 0);
}

#[tokio::test]
async fn full_flow_stage_complete_run_report() {
    init_tracing();
    let bus = InMemoryBus::default();
    let repository = Arc::new(InMemoryAppRepository::new());
    let backends = Arc::new(Backends::new(
        Arc::new(config(DiegoMode::Optional, DiegoMode::Optional, false)),
        Arc::new(bus.clone()),
        repository.clone(),
        Arc::new(MockLegacyScheduler::new()),
        catalog(),
        urls(),
    ));

    let mut app = Application::new("web");
    app.package_hash = Some("sha1-abc".to_string());
    app.stage_with_diego = true;
    app.run_with_diego = true;
    app.state = AppState::Started;
    app.instances = 2;
    app.routes = vec!["web.example.com".to_string()];
    repository.insert(app.clone()).await;

    let mut stage_requests = bus.subscribe(subjects::STAGING_START);
    let mut desires = bus.subscribe(subjects::DESIRE_APP);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(
        CompletionWorker::new(
            bus.subscribe(subjects::STAGING_FINISHED),
            backends.clone(),
            repository.clone(),
        )
        .run(shutdown_rx),
    );

    // Stage
    backends.validate_app_for_staging(&app).unwrap();
    backends.find_one_to_stage(&app).unwrap().stage().await.unwrap();

    let request = stage_requests.next().await.unwrap();
    let request: MessageEnvelope<StageRequestMessage> =
        MessageEnvelope::decode(&request.payload, subjects::STAGING_START).unwrap();
    let buildpacks: Vec<_> = request
        .payload
        .buildpack
        .as_ref()
        .unwrap()
        .buildpacks
        .iter()
        .map(|b| b.name.clone())
        .collect();
    assert_eq!(buildpacks, vec!["java", "ruby"]);

    // The stager reports back
    let completion = StagingCompletion::succeeded(
        app.id,
        request.payload.task_id,
        Some("java".to_string()),
        Some("java -jar app.jar".to_string()),
    );
    let envelope = MessageEnvelope::builder()
        .subject(subjects::STAGING_FINISHED)
        .app_id(app.id)
        .task_id(request.payload.task_id)
        .payload(completion)
        .build()
        .unwrap();
    bus.publish(subjects::STAGING_FINISHED, envelope.encode().unwrap())
        .await
        .unwrap();

    let desire = tokio::time::timeout(Duration::from_secs(5), desires.next())
        .await
        .expect("desire after staging")
        .unwrap();
    let desire: MessageEnvelope<ccd_messages::DesireAppMessage> =
        MessageEnvelope::decode(&desire.payload, subjects::DESIRE_APP).unwrap();
    assert_eq!(desire.payload.num_instances, 2);
    assert_eq!(desire.payload.routes, vec!["web.example.com"]);

    // Run and report
    let staged = repository.get(app.id).await.unwrap();
    assert!(staged.is_staged());
    backends.find_one_to_run(&staged).unwrap().scale().await.unwrap();

    let reporters = InstancesReporters::new(
        Arc::new(config(DiegoMode::Optional, DiegoMode::Optional, false)),
        Arc::new(LegacyInstancesReporter::new(
            Arc::new(MockHealthManager::new()),
            Arc::new(MockHealthManager::new()),
        )),
        Arc::new(DiegoInstancesReporter::new(Arc::new(
            MockLrpSource::new()
                .with_instance(&staged, 0, InstanceState::Running)
                .with_instance(&staged, 1, InstanceState::Starting),
        ))),
    );
    let instances = reporters.all_instances_for_app(&staged).await.unwrap();
    assert_eq!(instances.len(), 2);
    assert_eq!(
        reporters
            .number_of_starting_and_running_instances_for_app(&staged)
            .await
            .unwrap(),
        2
    );

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), worker)
        .await
        .expect("worker stops")
        .unwrap();
}
