use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ccd_id::AppId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{
    partition_started, unavailable, CrashedInstance, InstanceState, InstanceStats,
    InstanceStatus, InstancesReporter,
};
use crate::app::Application;
use crate::error::{ClientError, DispatchResult};

/// One actual long-running-process instance known to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LrpInstance {
    pub instance_guid: String,
    pub index: u32,
    pub state: InstanceState,
    pub since: DateTime<Utc>,
}

/// Instance queries against the declarative scheduler, keyed by process guid.
#[async_trait]
pub trait DiegoInstancesClient: Send + Sync {
    async fn lrp_instances(&self, process_guid: &str) -> Result<Vec<LrpInstance>, ClientError>;

    /// Instances for several processes in one request.
    async fn bulk_lrp_instances(
        &self,
        process_guids: &[String],
    ) -> Result<HashMap<String, Vec<LrpInstance>>, ClientError>;

    async fn lrp_stats(&self, process_guid: &str) -> Result<BTreeMap<u32, InstanceStats>, ClientError>;
}

pub struct DiegoInstancesReporter {
    client: Arc<dyn DiegoInstancesClient>,
}

impl DiegoInstancesReporter {
    pub fn new(client: Arc<dyn DiegoInstancesClient>) -> Self {
        Self { client }
    }
}

/// Distinct indices with a starting or running instance.
fn starting_or_running(instances: &[LrpInstance]) -> u32 {
    let indices: BTreeSet<u32> = instances
        .iter()
        .filter(|i| i.state.is_starting_or_running())
        .map(|i| i.index)
        .collect();
    indices.len() as u32
}

#[async_trait]
impl InstancesReporter for DiegoInstancesReporter {
    async fn number_of_starting_and_running_instances_for_app(
        &self,
        app: &Application,
    ) -> DispatchResult<u32> {
        if !app.is_started() {
            return Ok(0);
        }
        let instances = self
            .client
            .lrp_instances(&app.process_guid())
            .await
            .map_err(unavailable)?;
        Ok(starting_or_running(&instances))
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

        let guids: Vec<String> = started.iter().map(|app| app.process_guid()).collect();
        let reported = self
            .client
            .bulk_lrp_instances(&guids)
            .await
            .map_err(unavailable)?;
        debug!(started = started.len(), reported = reported.len(), "Counted instances");

        for (app, guid) in started.iter().zip(&guids) {
            let count = reported
                .get(guid)
                .map(|instances| starting_or_running(instances))
                .unwrap_or(0);
            counts.insert(app.id, count);
        }
        Ok(counts)
    }

    async fn all_instances_for_app(
        &self,
        app: &Application,
    ) -> DispatchResult<BTreeMap<u32, InstanceStatus>> {
        let instances = self
            .client
            .lrp_instances(&app.process_guid())
            .await
            .map_err(unavailable)?;
        Ok(instances
            .into_iter()
            .map(|i| {
                (
                    i.index,
                    InstanceStatus {
                        state: i.state,
                        since: i.since,
                    },
                )
            })
            .collect())
    }

    async fn crashed_instances_for_app(
        &self,
        app: &Application,
    ) -> DispatchResult<Vec<CrashedInstance>> {
        let instances = self
            .client
            .lrp_instances(&app.process_guid())
            .await
            .map_err(unavailable)?;
        Ok(instances
            .into_iter()
            .filter(|i| i.state == InstanceState::Crashed)
            .map(|i| CrashedInstance {
                instance_guid: i.instance_guid,
                index: i.index,
                since: i.since,
            })
            .collect())
    }

    async fn stats_for_app(&self, app: &Application) -> DispatchResult<BTreeMap<u32, InstanceStats>> {
        self.client
            .lrp_stats(&app.process_guid())
            .await
            .map_err(unavailable)
    }
}

// =============================================================================
// Mock LRP source
// =============================================================================

/// Mock declarative-scheduler instance source for testing and development.
#[derive(Default)]
pub struct MockLrpSource {
    instances: HashMap<String, Vec<LrpInstance>>,
    stats: HashMap<String, BTreeMap<u32, InstanceStats>>,
    unavailable: bool,
    single_calls: AtomicUsize,
    bulk_calls: AtomicUsize,
}

impl MockLrpSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source that fails every query.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn with_instance(mut self, app: &Application, index: u32, state: InstanceState) -> Self {
        let instances = self.instances.entry(app.process_guid()).or_default();
        let ordinal = instances.len();
        instances.push(LrpInstance {
            instance_guid: format!("{}-{}", app.id, ordinal),
            index,
            state,
            since: Utc::now(),
        });
        self
    }

    pub fn with_stats(mut self, app: &Application, index: u32, stats: InstanceStats) -> Self {
        self.stats
            .entry(app.process_guid())
            .or_default()
            .insert(index, stats);
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
            return Err(ClientError::Unavailable("tps unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DiegoInstancesClient for MockLrpSource {
    async fn lrp_instances(&self, process_guid: &str) -> Result<Vec<LrpInstance>, ClientError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.instances.get(process_guid).cloned().unwrap_or_default())
    }

    async fn bulk_lrp_instances(
        &self,
        process_guids: &[String],
    ) -> Result<HashMap<String, Vec<LrpInstance>>, ClientError> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(process_guids
            .iter()
            .filter_map(|guid| {
                self.instances
                    .get(guid)
                    .map(|instances| (guid.clone(), instances.clone()))
            })
            .collect())
    }

    async fn lrp_stats(&self, process_guid: &str) -> Result<BTreeMap<u32, InstanceStats>, ClientError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.stats.get(process_guid).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppState;
    use crate::error::DispatchError;

    fn started(name: &str) -> Application {
        let mut app = Application::new(name);
        app.state = AppState::Started;
        app.run_with_diego = true;
        app
    }

    #[tokio::test]
    async fn test_counts_distinct_starting_or_running_indices() {
        let app = started("web");
        let source = MockLrpSource::new()
            .with_instance(&app, 0, InstanceState::Running)
            .with_instance(&app, 1, InstanceState::Starting)
            .with_instance(&app, 1, InstanceState::Running)
            .with_instance(&app, 2, InstanceState::Crashed);
        let reporter = DiegoInstancesReporter::new(Arc::new(source));

        let count = reporter
            .number_of_starting_and_running_instances_for_app(&app)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_bulk_single_batch_and_zero_for_unreported() {
        let a = started("a");
        let b = started("b");
        let stopped = Application::new("c");
        let source = Arc::new(MockLrpSource::new().with_instance(&a, 0, InstanceState::Running));
        let reporter = DiegoInstancesReporter::new(source.clone());

        let counts = reporter
            .number_of_starting_and_running_instances_for_apps(&[&a, &stopped, &b])
            .await
            .unwrap();

        assert_eq!(counts.len(), 3);
        assert_eq!(counts[&a.id], 1);
        assert_eq!(counts[&b.id], 0);
        assert_eq!(counts[&stopped.id], 0);
        assert_eq!(source.bulk_calls(), 1);
        assert_eq!(source.single_calls(), 0);
    }

    #[tokio::test]
    async fn test_crashed_instances_filtered() {
        let app = started("web");
        let source = MockLrpSource::new()
            .with_instance(&app, 0, InstanceState::Running)
            .with_instance(&app, 1, InstanceState::Crashed);
        let reporter = DiegoInstancesReporter::new(Arc::new(source));

        let crashed = reporter.crashed_instances_for_app(&app).await.unwrap();
        assert_eq!(crashed.len(), 1);
        assert_eq!(crashed[0].index, 1);
    }

    #[tokio::test]
    async fn test_unreachable_source() {
        let reporter = DiegoInstancesReporter::new(Arc::new(MockLrpSource::unavailable()));
        let err = reporter.all_instances_for_app(&started("web")).await.unwrap_err();
        assert!(matches!(err, DispatchError::InstancesUnavailable(_)));
    }
}
