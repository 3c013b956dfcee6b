//! Per-app choice of instance reporter.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use ccd_id::AppId;

use super::{
    ensure_instances_reportable, CrashedInstance, InstanceStats, InstanceStatus,
    InstancesReporter,
};
use crate::app::Application;
use crate::config::{DiegoMode, DispatchConfig};
use crate::error::DispatchResult;

/// Routes instance queries to the reporter of the family running each app.
pub struct InstancesReporters {
    config: Arc<DispatchConfig>,
    legacy: Arc<dyn InstancesReporter>,
    diego: Arc<dyn InstancesReporter>,
}

impl InstancesReporters {
    pub fn new(
        config: Arc<DispatchConfig>,
        legacy: Arc<dyn InstancesReporter>,
        diego: Arc<dyn InstancesReporter>,
    ) -> Self {
        Self {
            config,
            legacy,
            diego,
        }
    }

    fn runs_on_diego(&self, app: &Application) -> bool {
        app.run_with_diego && self.config.running == DiegoMode::Optional
    }

    fn reporter_for_app(&self, app: &Application) -> &dyn InstancesReporter {
        if self.runs_on_diego(app) {
            self.diego.as_ref()
        } else {
            self.legacy.as_ref()
        }
    }

    pub async fn number_of_starting_and_running_instances_for_app(
        &self,
        app: &Application,
    ) -> DispatchResult<u32> {
        self.reporter_for_app(app)
            .number_of_starting_and_running_instances_for_app(app)
            .await
    }

    /// One entry per input app, with at most one batched query per family.
    pub async fn number_of_starting_and_running_instances_for_apps(
        &self,
        apps: &[Application],
    ) -> DispatchResult<HashMap<AppId, u32>> {
        let (diego, legacy): (Vec<&Application>, Vec<&Application>) =
            apps.iter().partition(|app| self.runs_on_diego(app));

        let mut counts = HashMap::with_capacity(apps.len());
        if !diego.is_empty() {
            counts.extend(
                self.diego
                    .number_of_starting_and_running_instances_for_apps(&diego)
                    .await?,
            );
        }
        if !legacy.is_empty() {
            counts.extend(
                self.legacy
                    .number_of_starting_and_running_instances_for_apps(&legacy)
                    .await?,
            );
        }
        Ok(counts)
    }

    pub async fn all_instances_for_app(
        &self,
        app: &Application,
    ) -> DispatchResult<BTreeMap<u32, InstanceStatus>> {
        ensure_instances_reportable(app)?;
        self.reporter_for_app(app).all_instances_for_app(app).await
    }

    pub async fn crashed_instances_for_app(
        &self,
        app: &Application,
    ) -> DispatchResult<Vec<CrashedInstance>> {
        ensure_instances_reportable(app)?;
        self.reporter_for_app(app).crashed_instances_for_app(app).await
    }

    pub async fn stats_for_app(&self, app: &Application) -> DispatchResult<BTreeMap<u32, InstanceStats>> {
        ensure_instances_reportable(app)?;
        self.reporter_for_app(app).stats_for_app(app).await
    }
}
