use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ccd_id::AppId;
use tracing::{debug, instrument};

use super::{
    partition_started, unavailable, CrashedInstance, InstanceStats, InstanceStatus,
    InstancesReporter,
};
use crate::app::Application;
use crate::error::{ClientError, DispatchError, DispatchResult};

/// Health manager of the legacy scheduler: counts and crashes.
#[async_trait]
pub trait HealthManagerClient: Send + Sync {
    async fn healthy_instances(&self, app: &Application) -> Result<u32, ClientError>;

    /// Healthy instance counts for every app in one request.
    async fn healthy_instances_bulk(
        &self,
        apps: &[&Application],
    ) -> Result<HashMap<AppId, u32>, ClientError>;

    async fn find_crashes(&self, app: &Application) -> Result<Vec<CrashedInstance>, ClientError>;
}

/// Per-instance queries against the legacy scheduler's agents.
///
/// Instance indices come back as strings.
#[async_trait]
pub trait LegacyInstancesClient: Send + Sync {
    async fn find_all_instances(
        &self,
        app: &Application,
    ) -> Result<HashMap<String, InstanceStatus>, ClientError>;

    async fn find_stats(
        &self,
        app: &Application,
    ) -> Result<HashMap<String, InstanceStats>, ClientError>;
}

pub struct LegacyInstancesReporter {
    health_manager: Arc<dyn HealthManagerClient>,
    instances: Arc<dyn LegacyInstancesClient>,
}

impl LegacyInstancesReporter {
    pub fn new(
        health_manager: Arc<dyn HealthManagerClient>,
        instances: Arc<dyn LegacyInstancesClient>,
    ) -> Self {
        Self {
            health_manager,
            instances,
        }
    }
}

fn normalize_indices<V>(reported: HashMap<String, V>) -> DispatchResult<BTreeMap<u32, V>> {
    reported
        .into_iter()
        .map(|(index, value)| {
            index.parse::<u32>().map(|i| (i, value)).map_err(|_| {
                DispatchError::InstancesUnavailable(format!("invalid instance index '{}'", index))
            })
        })
        .collect()
}

#[async_trait]
impl InstancesReporter for LegacyInstancesReporter {
    async fn number_of_starting_and_running_instances_for_app(
        &self,
        app: &Application,
    ) -> DispatchResult<u32> {
        if !app.is_started() {
            return Ok(0);
        }
        self.health_manager
            .healthy_instances(app)
            .await
            .map_err(unavailable)
    }

    #[instrument(skip(self, apps), fields(apps = apps.len()))]
    async fn number_of_starting_and_running_instances_for_apps(
        &self,
        apps: &[&Application],
    ) -> DispatchResult<HashMap<AppId, u32>> {
        let (started, stopped) = partition_started(apps);
        let mut counts: HashMap<AppId, u32> = stopped.iter().map(|app| (app.id, 0)).collect();

        if started.is_empty() {
            return Ok(counts);
        }

        let reported = self
            .health_manager
            .healthy_instances_bulk(&started)
            .await
            .map_err(unavailable)?;
        debug!(started = started.len(), stopped = stopped.len(), "Counted instances");

        // Only input apps are answered for, whatever the health manager returned.
        for app in started {
            counts.insert(app.id, reported.get(&app.id).copied().unwrap_or(0));
        }
        Ok(counts)
    }

    async fn all_instances_for_app(
        &self,
        app: &Application,
    ) -> DispatchResult<BTreeMap<u32, InstanceStatus>> {
        let reported = self
            .instances
            .find_all_instances(app)
            .await
            .map_err(unavailable)?;
        normalize_indices(reported)
    }

    async fn crashed_instances_for_app(
        &self,
        app: &Application,
    ) -> DispatchResult<Vec<CrashedInstance>> {
        self.health_manager
            .find_crashes(app)
            .await
            .map_err(unavailable)
    }

    async fn stats_for_app(&self, app: &Application) -> DispatchResult<BTreeMap<u32, InstanceStats>> {
        let reported = self.instances.find_stats(app).await.map_err(unavailable)?;
        normalize_indices(reported)
    }
}

// =============================================================================
// Mock health source
// =============================================================================

/// Mock legacy health source for testing and development.
///
/// Serves both the health manager and the per-instance queries from fixed
/// data and counts the calls it receives.
#[derive(Default)]
pub struct MockHealthManager {
    counts: HashMap<AppId, u32>,
    instances: HashMap<AppId, HashMap<String, InstanceStatus>>,
    stats: HashMap<AppId, HashMap<String, InstanceStats>>,
    crashes: HashMap<AppId, Vec<CrashedInstance>>,
    unavailable: bool,
    single_calls: AtomicUsize,
    bulk_calls: AtomicUsize,
}

impl MockHealthManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// A health source that fails every query.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn with_count(mut self, app_id: AppId, count: u32) -> Self {
        self.counts.insert(app_id, count);
        self
    }

    pub fn with_instance(mut self, app_id: AppId, index: impl Into<String>, status: InstanceStatus) -> Self {
        self.instances
            .entry(app_id)
            .or_default()
            .insert(index.into(), status);
        self
    }

    pub fn with_stats(mut self, app_id: AppId, index: impl Into<String>, stats: InstanceStats) -> Self {
        self.stats.entry(app_id).or_default().insert(index.into(), stats);
        self
    }

    pub fn with_crash(mut self, app_id: AppId, crash: CrashedInstance) -> Self {
        self.crashes.entry(app_id).or_default().push(crash);
        self
    }

    pub fn single_calls(&self) -> usize {
        self.single_calls.load(Ordering::SeqCst)
    }

    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), ClientError> {
        if self.unavailable {
            return Err(ClientError::Unavailable("health manager timed out".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl HealthManagerClient for MockHealthManager {
    async fn healthy_instances(&self, app: &Application) -> Result<u32, ClientError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.counts.get(&app.id).copied().unwrap_or(0))
    }

    async fn healthy_instances_bulk(
        &self,
        apps: &[&Application],
    ) -> Result<HashMap<AppId, u32>, ClientError> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(apps
            .iter()
            .filter_map(|app| self.counts.get(&app.id).map(|count| (app.id, *count)))
            .collect())
    }

    async fn find_crashes(&self, app: &Application) -> Result<Vec<CrashedInstance>, ClientError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.crashes.get(&app.id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl LegacyInstancesClient for MockHealthManager {
    async fn find_all_instances(
        &self,
        app: &Application,
    ) -> Result<HashMap<String, InstanceStatus>, ClientError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.instances.get(&app.id).cloned().unwrap_or_default())
    }

    async fn find_stats(
        &self,
        app: &Application,
    ) -> Result<HashMap<String, InstanceStats>, ClientError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.stats.get(&app.id).cloned().unwrap_or_default())
    }
}
