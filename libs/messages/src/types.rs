//! Payload definitions for every bus subject.

use ccd_id::{AppId, StagingTaskId};
use serde::{Deserialize, Serialize};

/// Bus subjects.
pub mod subjects {
    /// Stage requests for the declarative scheduler's stager.
    pub const STAGING_START: &str = "staging.start";

    /// Desired-state updates for the declarative scheduler.
    pub const DESIRE_APP: &str = "desired.app.state";

    /// Staging completion notifications published by the stager.
    pub const STAGING_FINISHED: &str = "staging.finished";
}

// =============================================================================
// Shared Sections
// =============================================================================

/// A single environment variable passed to staging or running containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
}

impl EnvironmentVariable {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// How the scheduler decides an instance is healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthCheckType {
    /// Healthy once the instance accepts connections on its port.
    #[default]
    Port,
    /// Healthy as soon as the process is running.
    None,
}

impl std::fmt::Display for HealthCheckType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthCheckType::Port => write!(f, "port"),
            HealthCheckType::None => write!(f, "none"),
        }
    }
}

/// Per-container resource limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub memory_mb: u32,
    pub disk_mb: u32,
    pub file_descriptors: u32,
}

// =============================================================================
// Staging
// =============================================================================

/// One buildpack offered to the stager, in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildpackEntry {
    pub name: String,
    pub key: String,
    pub url: String,
}

/// Buildpack-specific staging section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildpackStaging {
    pub buildpacks: Vec<BuildpackEntry>,
    pub app_bits_download_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_artifacts_cache_download_uri: Option<String>,
    pub build_artifacts_cache_upload_uri: String,
    pub droplet_upload_uri: String,
}

/// Private registry credentials for a docker image.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerCredentials {
    pub user: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl std::fmt::Debug for DockerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("email", &self.email)
            .finish()
    }
}

/// Docker-specific staging section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerStaging {
    pub docker_image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<DockerCredentials>,
}

/// Payload published on [`subjects::STAGING_START`].
///
/// Buildpack and docker requests share this shape; exactly one of the
/// `buildpack` and `docker` sections is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRequestMessage {
    pub app_id: AppId,
    pub task_id: StagingTaskId,
    pub stack: String,
    #[serde(flatten)]
    pub limits: ResourceLimits,
    pub environment: Vec<EnvironmentVariable>,
    /// Seconds the stager may spend before giving up.
    pub timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buildpack: Option<BuildpackStaging>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<DockerStaging>,
}

impl StageRequestMessage {
    pub fn is_docker(&self) -> bool {
        self.docker.is_some()
    }
}

// =============================================================================
// Desired State
// =============================================================================

/// Payload published on [`subjects::DESIRE_APP`].
///
/// Describes how the application should be running right now; the scheduler
/// converges actual state toward it, so publishing it twice is harmless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesireAppMessage {
    /// `<app guid>-<app version>`; changes whenever a restart is required.
    pub process_guid: String,
    pub log_guid: String,
    pub stack: String,
    #[serde(flatten)]
    pub limits: ResourceLimits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub droplet_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_command: Option<String>,
    pub environment: Vec<EnvironmentVariable>,
    pub num_instances: u32,
    pub routes: Vec<String>,
    pub health_check_type: HealthCheckType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_timeout_in_seconds: Option<u32>,
}

// =============================================================================
// Staging Completion
// =============================================================================

/// Failure detail reported by the stager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingFailure {
    /// Machine-readable reason, e.g. `NoAppDetectedError`.
    pub id: String,
    #[serde(default)]
    pub message: String,
}

/// Payload published on [`subjects::STAGING_FINISHED`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingCompletion {
    pub app_id: AppId,
    pub task_id: StagingTaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StagingFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_buildpack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buildpack_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_start_command: Option<String>,
}

impl StagingCompletion {
    /// A successful completion.
    pub fn succeeded(
        app_id: AppId,
        task_id: StagingTaskId,
        detected_buildpack: Option<String>,
        detected_start_command: Option<String>,
    ) -> Self {
        Self {
            app_id,
            task_id,
            error: None,
            detected_buildpack,
            buildpack_key: None,
            detected_start_command,
        }
    }

    /// A failed completion with the stager's reason id.
    pub fn failed(
        app_id: AppId,
        task_id: StagingTaskId,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            app_id,
            task_id,
            error: Some(StagingFailure {
                id: reason.into(),
                message: message.into(),
            }),
            detected_buildpack: None,
            buildpack_key: None,
            detected_start_command: None,
        }
    }

    /// Returns true if staging produced a runnable artifact.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
