//! Instance reporting.
//!
//! Each scheduler family has its own health source. Reporters never contact
//! it for apps that are not started, and bulk queries batch every started
//! app into one call.

mod diego;
mod legacy;
mod reporters;

pub use diego::{DiegoInstancesClient, DiegoInstancesReporter, LrpInstance, MockLrpSource};
pub use legacy::{
    HealthManagerClient, LegacyInstancesClient, LegacyInstancesReporter, MockHealthManager,
};
pub use reporters::InstancesReporters;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use ccd_id::AppId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::Application;
use crate::error::{ClientError, DispatchError, DispatchResult};

/// Instance lifecycle state as reported by a health source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceState {
    Starting,
    Running,
    Crashed,
    Flapping,
    Down,
    Unknown,
}

impl InstanceState {
    /// Parse a reported state; anything unrecognised is `Unknown`.
    pub fn from_reported(state: &str) -> Self {
        match state.to_ascii_uppercase().as_str() {
            "STARTING" | "CLAIMED" | "UNCLAIMED" => Self::Starting,
            "RUNNING" => Self::Running,
            "CRASHED" => Self::Crashed,
            "FLAPPING" => Self::Flapping,
            "DOWN" => Self::Down,
            _ => Self::Unknown,
        }
    }

    pub fn is_starting_or_running(&self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Crashed => "CRASHED",
            Self::Flapping => "FLAPPING",
            Self::Down => "DOWN",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStatus {
    pub state: InstanceState,
    pub since: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashedInstance {
    pub instance_guid: String,
    pub index: u32,
    pub since: DateTime<Utc>,
}

/// Resource usage sampled for one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub time: DateTime<Utc>,
    pub cpu: f64,
    pub mem_bytes: u64,
    pub disk_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceStats {
    pub state: InstanceState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub uptime_secs: u64,
    pub mem_quota_bytes: u64,
    pub disk_quota_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ResourceUsage>,
}

/// Queries one scheduler family's health source.
#[async_trait]
pub trait InstancesReporter: Send + Sync {
    /// Starting plus running instances; 0 without any query when the app is
    /// not started.
    async fn number_of_starting_and_running_instances_for_app(
        &self,
        app: &Application,
    ) -> DispatchResult<u32>;

    /// One entry per input app. Started apps are counted with a single batched
    /// query; stopped apps map to 0.
    async fn number_of_starting_and_running_instances_for_apps(
        &self,
        apps: &[&Application],
    ) -> DispatchResult<HashMap<AppId, u32>>;

    /// Instance index to state, as reported.
    async fn all_instances_for_app(
        &self,
        app: &Application,
    ) -> DispatchResult<BTreeMap<u32, InstanceStatus>>;

    async fn crashed_instances_for_app(
        &self,
        app: &Application,
    ) -> DispatchResult<Vec<CrashedInstance>>;

    async fn stats_for_app(&self, app: &Application) -> DispatchResult<BTreeMap<u32, InstanceStats>>;
}

/// Local app-state checks that take precedence over any instance query.
pub fn ensure_instances_reportable(app: &Application) -> DispatchResult<()> {
    if app.staging_failed() {
        return Err(DispatchError::from_staging_failure(app.staging_failed_reason));
    }
    if app.is_pending() {
        return Err(DispatchError::NotStaged);
    }
    if !app.is_started() {
        return Err(DispatchError::InstancesError(format!(
            "Request failed for app: {} as the app is in stopped state.",
            app.name
        )));
    }
    Ok(())
}

/// Split apps into those the health source must be asked about and those
/// that are known to have no instances.
pub(crate) fn partition_started<'a>(
    apps: &[&'a Application],
) -> (Vec<&'a Application>, Vec<&'a Application>) {
    apps.iter().copied().partition(|app| app.is_started())
}

pub(crate) fn unavailable(err: ClientError) -> DispatchError {
    DispatchError::InstancesUnavailable(err.to_string())
}
