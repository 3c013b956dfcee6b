//! Pre-flight checks run before any stage dispatch.
//!
//! Checks run in a fixed order and the first failure wins. Docker apps are
//! rejected before the package check, and the buildpack checks only run for
//! apps that got past both.

use crate::app::Application;
use crate::config::DispatchConfig;
use crate::error::{DispatchError, DispatchResult};

/// Validate that `app` may be staged.
///
/// `registered_buildpacks` is the number of admin buildpacks known to the
/// platform, enabled or not.
pub fn validate_app_for_staging(
    app: &Application,
    config: &DispatchConfig,
    registered_buildpacks: usize,
) -> DispatchResult<()> {
    if app.is_docker() && !config.diego_docker {
        return Err(DispatchError::DockerDisabled);
    }

    if !app.has_package() {
        return Err(DispatchError::AppPackageInvalid(
            "The app package hash is empty".to_string(),
        ));
    }

    if app.buildpack.is_custom() && !app.custom_buildpacks_enabled {
        return Err(DispatchError::CustomBuildpacksDisabled);
    }

    if registered_buildpacks == 0 && !app.buildpack.is_custom() {
        return Err(DispatchError::NoBuildpacksFound);
    }

    Ok(())
}
