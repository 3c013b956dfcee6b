//! Buildpack (droplet) protocol.

use std::sync::Arc;

use ccd_id::StagingTaskId;
use ccd_messages::{BuildpackEntry, BuildpackStaging, DesireAppMessage, StageRequestMessage};
use tracing::warn;

use super::{desire_base, stage_base, Protocol, ProtocolKind};
use crate::app::{Application, BuildpackRef};
use crate::buildpacks::{AdminBuildpack, BlobstoreUrlGenerator, BuildpackCatalog};

/// Name given to a buildpack supplied by URL.
const CUSTOM_BUILDPACK_NAME: &str = "custom";

pub struct TraditionalProtocol {
    urls: Arc<dyn BlobstoreUrlGenerator>,
    buildpacks: Arc<dyn BuildpackCatalog>,
    default_stack: String,
}

impl TraditionalProtocol {
    pub fn new(
        urls: Arc<dyn BlobstoreUrlGenerator>,
        buildpacks: Arc<dyn BuildpackCatalog>,
        default_stack: impl Into<String>,
    ) -> Self {
        Self {
            urls,
            buildpacks,
            default_stack: default_stack.into(),
        }
    }

    /// Buildpacks offered to the stager, in the order they should detect.
    fn buildpack_entries(&self, app: &Application) -> Vec<BuildpackEntry> {
        match &app.buildpack {
            BuildpackRef::Custom(url) => vec![BuildpackEntry {
                name: CUSTOM_BUILDPACK_NAME.to_string(),
                key: url.clone(),
                url: url.clone(),
            }],
            BuildpackRef::Admin(name) => match self.buildpacks.find_by_name(name) {
                Some(bp) => vec![self.admin_entry(&bp)],
                None => {
                    warn!(app_id = %app.id, buildpack = %name, "Named buildpack not registered; offering all");
                    self.auto_detect_entries()
                }
            },
            BuildpackRef::AutoDetect => self.auto_detect_entries(),
        }
    }

    fn auto_detect_entries(&self) -> Vec<BuildpackEntry> {
        self.buildpacks
            .enabled_in_order()
            .iter()
            .map(|bp| self.admin_entry(bp))
            .collect()
    }

    fn admin_entry(&self, bp: &AdminBuildpack) -> BuildpackEntry {
        BuildpackEntry {
            name: bp.name.clone(),
            key: bp.key.clone(),
            url: self.urls.admin_buildpack_download_url(bp),
        }
    }
}

impl Protocol for TraditionalProtocol {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Traditional
    }

    fn stage_request_message(
        &self,
        app: &Application,
        task_id: StagingTaskId,
        staging_timeout_secs: u64,
    ) -> StageRequestMessage {
        let mut message = stage_base(app, task_id, staging_timeout_secs, &self.default_stack);
        message.buildpack = Some(BuildpackStaging {
            buildpacks: self.buildpack_entries(app),
            app_bits_download_uri: self.urls.app_package_download_url(app),
            build_artifacts_cache_download_uri: self.urls.buildpack_cache_download_url(app),
            build_artifacts_cache_upload_uri: self.urls.buildpack_cache_upload_url(app),
            droplet_upload_uri: self.urls.droplet_upload_url(app),
        });
        message
    }

    fn desire_app_message(&self, app: &Application) -> DesireAppMessage {
        let mut message = desire_base(app, &self.default_stack);
        message.droplet_uri = Some(self.urls.droplet_download_url(app));
        message
    }
}
