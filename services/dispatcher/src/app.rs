//! Application record as seen by the dispatcher.
//!
//! The record is owned by the persistence layer. The dispatcher reads it and
//! requests staging-state transitions through [`crate::repository::AppRepository`];
//! it never writes fields directly.

use std::collections::BTreeMap;

use ccd_id::{AppId, SpaceId, StagingTaskId};
use ccd_messages::{DockerCredentials, HealthCheckType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::DEFAULT_STACK;

/// Requested lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppState {
    Started,
    #[default]
    Stopped,
}

/// Staging state of the current package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackageState {
    #[default]
    Pending,
    Staged,
    Failed,
}

impl std::fmt::Display for PackageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackageState::Pending => write!(f, "PENDING"),
            PackageState::Staged => write!(f, "STAGED"),
            PackageState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Why the last staging attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StagingFailureReason {
    NoAppDetectedError,
    BuildpackCompileFailed,
    BuildpackReleaseFailed,
    StagingError,
}

impl StagingFailureReason {
    /// Maps a scheduler-reported reason id onto the known set; anything
    /// unrecognised is a generic staging error.
    pub fn classify(reason: &str) -> Self {
        match reason {
            "NoAppDetectedError" => Self::NoAppDetectedError,
            "BuildpackCompileFailed" => Self::BuildpackCompileFailed,
            "BuildpackReleaseFailed" => Self::BuildpackReleaseFailed,
            _ => Self::StagingError,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoAppDetectedError => "NoAppDetectedError",
            Self::BuildpackCompileFailed => "BuildpackCompileFailed",
            Self::BuildpackReleaseFailed => "BuildpackReleaseFailed",
            Self::StagingError => "StagingError",
        }
    }
}

impl std::fmt::Display for StagingFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which buildpack the app asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BuildpackRef {
    /// Let every enabled admin buildpack try to detect the app.
    #[default]
    AutoDetect,
    /// A buildpack registered by an administrator, by name.
    Admin(String),
    /// A buildpack fetched from an arbitrary git URL.
    Custom(String),
}

impl BuildpackRef {
    pub fn is_custom(&self) -> bool {
        matches!(self, BuildpackRef::Custom(_))
    }
}

/// An application record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: AppId,
    pub name: String,
    pub space_id: SpaceId,

    /// Changes whenever a restart is required; part of the process guid.
    pub version: Uuid,

    pub stack: String,
    pub buildpack: BuildpackRef,
    pub docker_image: Option<String>,
    pub docker_credentials: Option<DockerCredentials>,
    pub package_hash: Option<String>,
    pub droplet_hash: Option<String>,

    /// Whether the org/space permits custom buildpack URLs.
    pub custom_buildpacks_enabled: bool,

    pub stage_with_diego: bool,
    pub run_with_diego: bool,

    pub state: AppState,
    pub package_state: PackageState,
    pub staging_failed_reason: Option<StagingFailureReason>,

    /// The staging attempt whose completion is currently expected.
    pub staging_task_id: Option<StagingTaskId>,

    pub detected_buildpack: Option<String>,
    pub detected_buildpack_key: Option<String>,
    pub detected_start_command: Option<String>,

    /// User-supplied start command; wins over the detected one.
    pub command: Option<String>,

    pub instances: u32,
    pub memory_mb: u32,
    pub disk_quota_mb: u32,
    pub file_descriptors: u32,
    pub routes: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub health_check_type: HealthCheckType,
    pub health_check_timeout: Option<u32>,
}

impl Application {
    /// A stopped, unstaged app with platform default limits.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: AppId::new(),
            name: name.into(),
            space_id: SpaceId::new(),
            version: Uuid::new_v4(),
            stack: DEFAULT_STACK.to_string(),
            buildpack: BuildpackRef::AutoDetect,
            docker_image: None,
            docker_credentials: None,
            package_hash: None,
            droplet_hash: None,
            custom_buildpacks_enabled: true,
            stage_with_diego: false,
            run_with_diego: false,
            state: AppState::Stopped,
            package_state: PackageState::Pending,
            staging_failed_reason: None,
            staging_task_id: None,
            detected_buildpack: None,
            detected_buildpack_key: None,
            detected_start_command: None,
            command: None,
            instances: 1,
            memory_mb: 256,
            disk_quota_mb: 1024,
            file_descriptors: 16384,
            routes: Vec::new(),
            environment: BTreeMap::new(),
            health_check_type: HealthCheckType::Port,
            health_check_timeout: None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.state == AppState::Started
    }

    pub fn is_staged(&self) -> bool {
        self.package_state == PackageState::Staged
    }

    pub fn is_pending(&self) -> bool {
        self.package_state == PackageState::Pending
    }

    pub fn staging_failed(&self) -> bool {
        self.package_state == PackageState::Failed
    }

    /// True when the app runs a docker image rather than a buildpack droplet.
    pub fn is_docker(&self) -> bool {
        self.docker_image
            .as_deref()
            .is_some_and(|image| !image.trim().is_empty())
    }

    pub fn has_package(&self) -> bool {
        self.package_hash
            .as_deref()
            .is_some_and(|hash| !hash.trim().is_empty())
    }

    /// Instance count the scheduler should converge to right now.
    pub fn desired_instances(&self) -> u32 {
        if self.is_started() {
            self.instances
        } else {
            0
        }
    }

    /// Identifies the running process generation to the scheduler.
    pub fn process_guid(&self) -> String {
        format!("{}-{}", self.id, self.version)
    }

    /// Command used to start the app: user-supplied first, detected second.
    pub fn start_command(&self) -> Option<&str> {
        self.command
            .as_deref()
            .or(self.detected_start_command.as_deref())
    }
}
