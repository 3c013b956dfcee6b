//! Container image protocol.

use ccd_id::StagingTaskId;
use ccd_messages::{DesireAppMessage, DockerStaging, StageRequestMessage};

use super::{desire_base, stage_base, Protocol, ProtocolKind};
use crate::app::Application;
use crate::config::DEFAULT_STACK;

#[derive(Debug, Clone)]
pub struct DockerProtocol {
    default_stack: String,
}

impl DockerProtocol {
    pub fn new(default_stack: impl Into<String>) -> Self {
        Self {
            default_stack: default_stack.into(),
        }
    }
}

impl Default for DockerProtocol {
    fn default() -> Self {
        Self::new(DEFAULT_STACK)
    }
}

impl Protocol for DockerProtocol {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Docker
    }

    fn stage_request_message(
        &self,
        app: &Application,
        task_id: StagingTaskId,
        staging_timeout_secs: u64,
    ) -> StageRequestMessage {
        let mut message = stage_base(app, task_id, staging_timeout_secs, &self.default_stack);
        message.docker = Some(DockerStaging {
            docker_image: app.docker_image.clone().unwrap_or_default(),
            credentials: app.docker_credentials.clone(),
        });
        message
    }

    fn desire_app_message(&self, app: &Application) -> DesireAppMessage {
        let mut message = desire_base(app, &self.default_stack);
        message.docker_image = app.docker_image.clone();
        message
    }
}
