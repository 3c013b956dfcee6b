//! Caller-facing dispatch errors.
//!
//! Every condition a caller can act on carries a stable numeric code and
//! name so the surrounding API layer can render it without inspecting
//! message text.

use ccd_id::AppId;
use ccd_messages::MessageError;
use thiserror::Error;

use crate::app::StagingFailureReason;
use crate::bus::BusError;
use crate::repository::RepositoryError;

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors raised by external scheduler and health-source clients.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The remote side could not be reached or timed out.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The remote side answered with something we could not use.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Errors surfaced by the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Docker support has not been enabled")]
    DockerDisabled,

    #[error("The app package is invalid: {0}")]
    AppPackageInvalid(String),

    #[error("Custom buildpacks are disabled")]
    CustomBuildpacksDisabled,

    #[error("There are no buildpacks available")]
    NoBuildpacksFound,

    #[error("Diego has not been enabled")]
    DiegoDisabled,

    #[error("Staging error: {0}")]
    StagingError(String),

    #[error("App has not finished staging")]
    NotStaged,

    #[error("An app was not successfully detected by any available buildpack")]
    NoAppDetected,

    #[error("App staging failed in the buildpack compile phase")]
    BuildpackCompileFailed,

    #[error("App staging failed in the buildpack release phase")]
    BuildpackReleaseFailed,

    #[error("Instances error: {0}")]
    InstancesError(String),

    #[error("Instances information unavailable: {0}")]
    InstancesUnavailable(String),

    #[error("The app could not be found: {0}")]
    AppNotFound(AppId),

    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("legacy scheduler error: {0}")]
    LegacyScheduler(#[source] ClientError),

    #[error("message bus error: {0}")]
    Bus(#[from] BusError),

    #[error("message encoding error: {0}")]
    Message(#[from] MessageError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl DispatchError {
    /// The error raised when querying an app whose last staging attempt failed.
    pub fn from_staging_failure(reason: Option<StagingFailureReason>) -> Self {
        match reason {
            Some(StagingFailureReason::NoAppDetectedError) => Self::NoAppDetected,
            Some(StagingFailureReason::BuildpackCompileFailed) => Self::BuildpackCompileFailed,
            Some(StagingFailureReason::BuildpackReleaseFailed) => Self::BuildpackReleaseFailed,
            Some(StagingFailureReason::StagingError) | None => {
                Self::StagingError("staging failed".to_string())
            }
        }
    }

    /// Stable numeric code.
    pub fn code(&self) -> u32 {
        match self {
            Self::AppNotFound(_) => 100004,
            Self::AppPackageInvalid(_) => 150001,
            Self::StagingError(_) => 170001,
            Self::NotStaged => 170002,
            Self::NoAppDetected => 170003,
            Self::BuildpackCompileFailed => 170004,
            Self::BuildpackReleaseFailed => 170005,
            Self::NoBuildpacksFound => 170006,
            Self::CustomBuildpacksDisabled => 170007,
            Self::DiegoDisabled => 170008,
            Self::DockerDisabled => 170009,
            Self::InstancesError(_) => 220001,
            Self::InstancesUnavailable(_) => 220002,
            Self::Unsupported { .. }
            | Self::LegacyScheduler(_)
            | Self::Bus(_)
            | Self::Message(_)
            | Self::Repository(_) => 10001,
        }
    }

    /// Stable name matching the code.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DockerDisabled => "DockerDisabled",
            Self::AppPackageInvalid(_) => "AppPackageInvalid",
            Self::CustomBuildpacksDisabled => "CustomBuildpacksDisabled",
            Self::NoBuildpacksFound => "NoBuildpacksFound",
            Self::DiegoDisabled => "DiegoDisabled",
            Self::StagingError(_) => "StagingError",
            Self::NotStaged => "NotStaged",
            Self::NoAppDetected => "NoAppDetectedError",
            Self::BuildpackCompileFailed => "BuildpackCompileFailed",
            Self::BuildpackReleaseFailed => "BuildpackReleaseFailed",
            Self::InstancesError(_) => "InstancesError",
            Self::InstancesUnavailable(_) => "InstancesUnavailable",
            Self::AppNotFound(_) => "AppNotFound",
            Self::Unsupported { .. }
            | Self::LegacyScheduler(_)
            | Self::Bus(_)
            | Self::Message(_)
            | Self::Repository(_) => "ServerError",
        }
    }

    /// True for conditions the caller must fix; retrying cannot help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::DockerDisabled
                | Self::AppPackageInvalid(_)
                | Self::CustomBuildpacksDisabled
                | Self::NoBuildpacksFound
                | Self::DiegoDisabled
        )
    }

    /// True for errors derived from the app's own state rather than from
    /// any remote system.
    pub fn is_app_state_error(&self) -> bool {
        matches!(
            self,
            Self::StagingError(_)
                | Self::NotStaged
                | Self::NoAppDetected
                | Self::BuildpackCompileFailed
                | Self::BuildpackReleaseFailed
                | Self::InstancesError(_)
        )
    }
}
