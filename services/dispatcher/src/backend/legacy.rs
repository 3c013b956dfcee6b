use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ccd_id::AppId;
use ccd_messages::{DesireAppMessage, StagingCompletion};
use tracing::{info, instrument};

use super::{Backend, BackendKind};
use crate::app::Application;
use crate::error::{ClientError, DispatchError, DispatchResult};
use crate::staging::CompletionOutcome;

/// Direct client of the legacy scheduler.
#[async_trait]
pub trait LegacySchedulerClient: Send + Sync {
    /// Stage the app; the legacy scheduler handles completion itself.
    async fn stage(&self, app: &Application) -> Result<(), ClientError>;

    async fn start_instances(&self, app: &Application, instances: u32) -> Result<(), ClientError>;

    async fn stop(&self, app: &Application) -> Result<(), ClientError>;

    async fn scale_instances(&self, app: &Application, instances: u32) -> Result<(), ClientError>;

    async fn update_uris(&self, app: &Application) -> Result<(), ClientError>;
}

/// Backend for the legacy scheduler.
pub struct LegacyBackend {
    app: Application,
    client: Arc<dyn LegacySchedulerClient>,
}

impl LegacyBackend {
    pub fn new(app: Application, client: Arc<dyn LegacySchedulerClient>) -> Self {
        Self { app, client }
    }
}

#[async_trait]
impl Backend for LegacyBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Legacy
    }

    fn app(&self) -> &Application {
        &self.app
    }

    #[instrument(skip(self), fields(app_id = %self.app.id))]
    async fn stage(&self) -> DispatchResult<()> {
        info!("Staging on legacy scheduler");
        self.client
            .stage(&self.app)
            .await
            .map_err(DispatchError::LegacyScheduler)
    }

    async fn start(&self) -> DispatchResult<()> {
        self.client
            .start_instances(&self.app, self.app.instances)
            .await
            .map_err(DispatchError::LegacyScheduler)
    }

    async fn stop(&self) -> DispatchResult<()> {
        self.client
            .stop(&self.app)
            .await
            .map_err(DispatchError::LegacyScheduler)
    }

    async fn scale(&self) -> DispatchResult<()> {
        self.client
            .scale_instances(&self.app, self.app.desired_instances())
            .await
            .map_err(DispatchError::LegacyScheduler)
    }

    async fn update_routes(&self) -> DispatchResult<()> {
        self.client
            .update_uris(&self.app)
            .await
            .map_err(DispatchError::LegacyScheduler)
    }

    async fn staging_complete(
        &self,
        _completion: &StagingCompletion,
    ) -> DispatchResult<CompletionOutcome> {
        Err(DispatchError::Unsupported {
            backend: "legacy",
            operation: "staging_complete",
        })
    }

    fn desire_app_message(&self) -> Option<DesireAppMessage> {
        None
    }
}

// =============================================================================
// Mock client
// =============================================================================

/// A call received by [`MockLegacyScheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyCall {
    Stage(AppId),
    Start { app_id: AppId, instances: u32 },
    Stop(AppId),
    Scale { app_id: AppId, instances: u32 },
    UpdateUris { app_id: AppId, uris: Vec<String> },
}

/// Mock legacy scheduler for testing and development.
#[derive(Default)]
pub struct MockLegacyScheduler {
    calls: Mutex<Vec<LegacyCall>>,
    unavailable: bool,
}

impl MockLegacyScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scheduler that rejects every call.
    pub fn unavailable() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            unavailable: true,
        }
    }

    pub fn calls(&self) -> Vec<LegacyCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn record(&self, call: LegacyCall) -> Result<(), ClientError> {
        if self.unavailable {
            return Err(ClientError::Unavailable(
                "legacy scheduler not responding".to_string(),
            ));
        }
        info!(call = ?call, "[MOCK] Legacy scheduler call");
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(call);
        Ok(())
    }
}

#[async_trait]
impl LegacySchedulerClient for MockLegacyScheduler {
    async fn stage(&self, app: &Application) -> Result<(), ClientError> {
        self.record(LegacyCall::Stage(app.id))
    }

    async fn start_instances(&self, app: &Application, instances: u32) -> Result<(), ClientError> {
        self.record(LegacyCall::Start {
            app_id: app.id,
            instances,
        })
    }

    async fn stop(&self, app: &Application) -> Result<(), ClientError> {
        self.record(LegacyCall::Stop(app.id))
    }

    async fn scale_instances(&self, app: &Application, instances: u32) -> Result<(), ClientError> {
        self.record(LegacyCall::Scale {
            app_id: app.id,
            instances,
        })
    }

    async fn update_uris(&self, app: &Application) -> Result<(), ClientError> {
        self.record(LegacyCall::UpdateUris {
            app_id: app.id,
            uris: app.routes.clone(),
        })
    }
}
