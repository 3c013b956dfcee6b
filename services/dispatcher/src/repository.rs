//! Persistence seam for application records.
//!
//! Staging-state transitions are compare-and-set on the staging task id: a
//! transition for an attempt that is no longer current is reported as
//! [`TransitionOutcome::Superseded`] and leaves the record untouched.

use std::collections::HashMap;

use async_trait::async_trait;
use ccd_id::{AppId, StagingTaskId};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::app::{Application, PackageState, StagingFailureReason};

/// Errors returned by the persistence layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("app not found: {0}")]
    NotFound(AppId),

    #[error("storage error: {0}")]
    Storage(String),
}

/// What a successful staging attempt detected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StagingResult {
    pub detected_buildpack: Option<String>,
    pub buildpack_key: Option<String>,
    pub detected_start_command: Option<String>,
}

/// Result of a compare-and-set staging transition.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The transition was written; carries the updated record.
    Applied(Application),

    /// The attempt is no longer current; nothing was written.
    Superseded { current: Option<StagingTaskId> },
}

/// Application persistence.
#[async_trait]
pub trait AppRepository: Send + Sync {
    /// Load an app by id.
    async fn find(&self, id: AppId) -> Result<Option<Application>, RepositoryError>;

    /// Record a new staging attempt as the current one and reset the
    /// package to pending.
    async fn begin_staging(
        &self,
        id: AppId,
        task_id: StagingTaskId,
    ) -> Result<Application, RepositoryError>;

    /// Mark the package staged if `task_id` is still the current attempt.
    async fn mark_as_staged(
        &self,
        id: AppId,
        task_id: StagingTaskId,
        result: &StagingResult,
    ) -> Result<TransitionOutcome, RepositoryError>;

    /// Mark the package failed if `task_id` is still the current attempt.
    async fn mark_as_failed_to_stage(
        &self,
        id: AppId,
        task_id: StagingTaskId,
        reason: StagingFailureReason,
    ) -> Result<TransitionOutcome, RepositoryError>;
}

/// In-process repository used by the dev binary and tests.
#[derive(Default)]
pub struct InMemoryAppRepository {
    apps: RwLock<HashMap<AppId, Application>>,
}

impl InMemoryAppRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record.
    pub async fn insert(&self, app: Application) {
        self.apps.write().await.insert(app.id, app);
    }

    /// Remove a record, returning it if present.
    pub async fn remove(&self, id: AppId) -> Option<Application> {
        self.apps.write().await.remove(&id)
    }

    pub async fn get(&self, id: AppId) -> Option<Application> {
        self.apps.read().await.get(&id).cloned()
    }

    /// Apply `f` only while `task_id` is the current attempt.
    async fn transition<F>(
        &self,
        id: AppId,
        task_id: StagingTaskId,
        f: F,
    ) -> Result<TransitionOutcome, RepositoryError>
    where
        F: FnOnce(&mut Application) + Send,
    {
        let mut apps = self.apps.write().await;
        let app = apps.get_mut(&id).ok_or(RepositoryError::NotFound(id))?;

        if app.staging_task_id != Some(task_id) {
            debug!(
                app_id = %id,
                task_id = %task_id,
                current = ?app.staging_task_id,
                "Rejecting transition for superseded staging attempt"
            );
            return Ok(TransitionOutcome::Superseded {
                current: app.staging_task_id,
            });
        }

        f(app);
        Ok(TransitionOutcome::Applied(app.clone()))
    }
}

#[async_trait]
impl AppRepository for InMemoryAppRepository {
    async fn find(&self, id: AppId) -> Result<Option<Application>, RepositoryError> {
        Ok(self.get(id).await)
    }

    async fn begin_staging(
        &self,
        id: AppId,
        task_id: StagingTaskId,
    ) -> Result<Application, RepositoryError> {
        let mut apps = self.apps.write().await;
        let app = apps.get_mut(&id).ok_or(RepositoryError::NotFound(id))?;
        app.staging_task_id = Some(task_id);
        app.package_state = PackageState::Pending;
        app.staging_failed_reason = None;
        Ok(app.clone())
    }

    async fn mark_as_staged(
        &self,
        id: AppId,
        task_id: StagingTaskId,
        result: &StagingResult,
    ) -> Result<TransitionOutcome, RepositoryError> {
        let result = result.clone();
        self.transition(id, task_id, move |app| {
            app.package_state = PackageState::Staged;
            app.staging_failed_reason = None;
            app.detected_buildpack = result.detected_buildpack;
            app.detected_buildpack_key = result.buildpack_key;
            app.detected_start_command = result.detected_start_command;
        })
        .await
    }

    async fn mark_as_failed_to_stage(
        &self,
        id: AppId,
        task_id: StagingTaskId,
        reason: StagingFailureReason,
    ) -> Result<TransitionOutcome, RepositoryError> {
        self.transition(id, task_id, move |app| {
            app.package_state = PackageState::Failed;
            app.staging_failed_reason = Some(reason);
        })
        .await
    }
}
