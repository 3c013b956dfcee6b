//! Message builders for the declarative scheduler.
//!
//! Buildpack and docker apps share one envelope shape for both stage and
//! desire messages; the variants differ only in the staging-specific section
//! and in whether a droplet or an image is run.

mod docker;
mod traditional;

pub use docker::DockerProtocol;
pub use traditional::TraditionalProtocol;

use ccd_id::StagingTaskId;
use ccd_messages::{DesireAppMessage, EnvironmentVariable, ResourceLimits, StageRequestMessage};

use crate::app::Application;

/// Which protocol variant built a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    /// Buildpack staging producing a droplet.
    Traditional,
    /// Container image staging.
    Docker,
}

impl std::fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolKind::Traditional => write!(f, "traditional"),
            ProtocolKind::Docker => write!(f, "docker"),
        }
    }
}

/// Pure builder of scheduler messages for one protocol variant.
pub trait Protocol: Send + Sync {
    fn kind(&self) -> ProtocolKind;

    /// Build the request for staging attempt `task_id`.
    fn stage_request_message(
        &self,
        app: &Application,
        task_id: StagingTaskId,
        staging_timeout_secs: u64,
    ) -> StageRequestMessage;

    /// Build the desired state reflecting the app as currently persisted.
    fn desire_app_message(&self, app: &Application) -> DesireAppMessage;
}

pub(crate) fn resource_limits(app: &Application) -> ResourceLimits {
    ResourceLimits {
        memory_mb: app.memory_mb,
        disk_mb: app.disk_quota_mb,
        file_descriptors: app.file_descriptors,
    }
}

/// User environment in name order, followed by platform-provided variables.
pub(crate) fn environment(app: &Application) -> Vec<EnvironmentVariable> {
    let mut env: Vec<EnvironmentVariable> = app
        .environment
        .iter()
        .map(|(name, value)| EnvironmentVariable::new(name, value))
        .collect();

    env.push(EnvironmentVariable::new(
        "MEMORY_LIMIT",
        format!("{}m", app.memory_mb),
    ));
    env.push(EnvironmentVariable::new(
        "VCAP_APPLICATION",
        vcap_application(app).to_string(),
    ));
    env
}

fn vcap_application(app: &Application) -> serde_json::Value {
    serde_json::json!({
        "application_id": app.id.to_string(),
        "application_name": app.name,
        "application_version": app.version.to_string(),
        "application_uris": app.routes,
        "space_id": app.space_id.to_string(),
        "limits": {
            "mem": app.memory_mb,
            "disk": app.disk_quota_mb,
            "fds": app.file_descriptors,
        },
    })
}

/// The app's stack, or `default_stack` when the app names none.
pub(crate) fn stack(app: &Application, default_stack: &str) -> String {
    if app.stack.trim().is_empty() {
        default_stack.to_string()
    } else {
        app.stack.clone()
    }
}

/// Fields shared by both variants' desire messages.
pub(crate) fn desire_base(app: &Application, default_stack: &str) -> DesireAppMessage {
    DesireAppMessage {
        process_guid: app.process_guid(),
        log_guid: app.id.to_string(),
        stack: stack(app, default_stack),
        limits: resource_limits(app),
        droplet_uri: None,
        docker_image: None,
        start_command: app.start_command().map(str::to_string),
        environment: environment(app),
        num_instances: app.desired_instances(),
        routes: app.routes.clone(),
        health_check_type: app.health_check_type,
        health_check_timeout_in_seconds: app.health_check_timeout,
    }
}

/// Fields shared by both variants' stage requests.
pub(crate) fn stage_base(
    app: &Application,
    task_id: StagingTaskId,
    staging_timeout_secs: u64,
    default_stack: &str,
) -> StageRequestMessage {
    StageRequestMessage {
        app_id: app.id,
        task_id,
        stack: stack(app, default_stack),
        limits: resource_limits(app),
        environment: environment(app),
        timeout: staging_timeout_secs,
        buildpack: None,
        docker: None,
    }
}
