//! Backend selection.
//!
//! The only place that decides which scheduler family handles an app. Staging
//! and running are decided independently from the matching config mode and
//! the app's own desire flag.

use std::sync::Arc;

use tracing::debug;

use crate::app::Application;
use crate::backend::{Backend, DiegoBackend, LegacyBackend, LegacySchedulerClient};
use crate::buildpacks::{BlobstoreUrlGenerator, BuildpackCatalog};
use crate::bus::MessageBus;
use crate::config::{DiegoMode, DispatchConfig};
use crate::error::{DispatchError, DispatchResult};
use crate::messenger::Messenger;
use crate::protocol::{DockerProtocol, Protocol, TraditionalProtocol};
use crate::repository::AppRepository;
use crate::staging::StagingCompletionHandler;
use crate::validation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Legacy,
    Diego,
}

fn select(mode: DiegoMode, desires_diego: bool) -> DispatchResult<Family> {
    match (mode, desires_diego) {
        (DiegoMode::Disabled, true) => Err(DispatchError::DiegoDisabled),
        (DiegoMode::Disabled, false) | (DiegoMode::Optional, false) => Ok(Family::Legacy),
        (DiegoMode::Optional, true) => Ok(Family::Diego),
    }
}

/// Builds the backend responsible for an app.
pub struct Backends {
    config: Arc<DispatchConfig>,
    bus: Arc<dyn MessageBus>,
    repository: Arc<dyn AppRepository>,
    legacy_client: Arc<dyn LegacySchedulerClient>,
    buildpacks: Arc<dyn BuildpackCatalog>,
    urls: Arc<dyn BlobstoreUrlGenerator>,
}

impl Backends {
    pub fn new(
        config: Arc<DispatchConfig>,
        bus: Arc<dyn MessageBus>,
        repository: Arc<dyn AppRepository>,
        legacy_client: Arc<dyn LegacySchedulerClient>,
        buildpacks: Arc<dyn BuildpackCatalog>,
        urls: Arc<dyn BlobstoreUrlGenerator>,
    ) -> Self {
        Self {
            config,
            bus,
            repository,
            legacy_client,
            buildpacks,
            urls,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Check that `app` may be staged at all.
    pub fn validate_app_for_staging(&self, app: &Application) -> DispatchResult<()> {
        validation::validate_app_for_staging(app, &self.config, self.buildpacks.count())
    }

    /// The backend that should stage `app`.
    pub fn find_one_to_stage(&self, app: &Application) -> DispatchResult<Box<dyn Backend>> {
        let family = select(self.config.staging, app.stage_with_diego)?;
        debug!(app_id = %app.id, family = ?family, "Selected staging backend");
        Ok(self.build(family, app))
    }

    /// The backend that should run `app`.
    pub fn find_one_to_run(&self, app: &Application) -> DispatchResult<Box<dyn Backend>> {
        let family = select(self.config.running, app.run_with_diego)?;
        debug!(app_id = %app.id, family = ?family, "Selected running backend");
        Ok(self.build(family, app))
    }

    /// The declarative-scheduler backend for `app`, with the protocol
    /// matching its artifact type.
    pub fn diego_backend(&self, app: &Application) -> DiegoBackend {
        let protocol: Arc<dyn Protocol> = if app.is_docker() {
            Arc::new(DockerProtocol::new(self.config.default_stack.clone()))
        } else {
            Arc::new(TraditionalProtocol::new(
                self.urls.clone(),
                self.buildpacks.clone(),
                self.config.default_stack.clone(),
            ))
        };
        let kind = protocol.kind();
        let messenger = Messenger::new(
            self.bus.clone(),
            protocol,
            self.config.staging_timeout_secs(),
        );
        let completion_handler = Arc::new(StagingCompletionHandler::new(
            kind,
            self.repository.clone(),
            messenger.clone(),
        ));

        DiegoBackend::new(
            app.clone(),
            messenger,
            completion_handler,
            self.repository.clone(),
        )
    }

    fn legacy_backend(&self, app: &Application) -> LegacyBackend {
        LegacyBackend::new(app.clone(), self.legacy_client.clone())
    }

    fn build(&self, family: Family, app: &Application) -> Box<dyn Backend> {
        match family {
            Family::Legacy => Box::new(self.legacy_backend(app)),
            Family::Diego => Box::new(self.diego_backend(app)),
        }
    }
}
