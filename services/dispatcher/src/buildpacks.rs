//! Admin buildpack registry seam.

use crate::app::Application;

/// A buildpack registered by an administrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminBuildpack {
    pub name: String,
    /// Blobstore key of the buildpack bits.
    pub key: String,
    /// Detection order; lower runs first.
    pub position: u32,
    pub enabled: bool,
}

impl AdminBuildpack {
    pub fn new(name: impl Into<String>, key: impl Into<String>, position: u32) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            position,
            enabled: true,
        }
    }
}

/// Read access to the registered admin buildpacks.
pub trait BuildpackCatalog: Send + Sync {
    /// Every registered buildpack, enabled or not.
    fn all(&self) -> Vec<AdminBuildpack>;

    fn count(&self) -> usize {
        self.all().len()
    }

    fn find_by_name(&self, name: &str) -> Option<AdminBuildpack> {
        self.all().into_iter().find(|bp| bp.name == name)
    }

    /// Enabled buildpacks in detection order.
    fn enabled_in_order(&self) -> Vec<AdminBuildpack> {
        let mut enabled: Vec<_> = self.all().into_iter().filter(|bp| bp.enabled).collect();
        enabled.sort_by_key(|bp| bp.position);
        enabled
    }
}

/// Fixed catalog, loaded once.
#[derive(Debug, Clone, Default)]
pub struct StaticBuildpackCatalog {
    buildpacks: Vec<AdminBuildpack>,
}

impl StaticBuildpackCatalog {
    pub fn new(buildpacks: Vec<AdminBuildpack>) -> Self {
        Self { buildpacks }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl BuildpackCatalog for StaticBuildpackCatalog {
    fn all(&self) -> Vec<AdminBuildpack> {
        self.buildpacks.clone()
    }
}

/// Source of the URLs schedulers use to move bits in and out of the blobstore.
pub trait BlobstoreUrlGenerator: Send + Sync {
    fn app_package_download_url(&self, app: &Application) -> String;
    fn buildpack_cache_download_url(&self, app: &Application) -> Option<String>;
    fn buildpack_cache_upload_url(&self, app: &Application) -> String;
    fn droplet_upload_url(&self, app: &Application) -> String;
    /// Stable download URL of the app's current droplet.
    fn droplet_download_url(&self, app: &Application) -> String;
    fn admin_buildpack_download_url(&self, buildpack: &AdminBuildpack) -> String;
}

/// Generates URLs against the internal staging endpoints under one base URL.
#[derive(Debug, Clone)]
pub struct InternalUrlGenerator {
    base_url: String,
}

impl InternalUrlGenerator {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl BlobstoreUrlGenerator for InternalUrlGenerator {
    fn app_package_download_url(&self, app: &Application) -> String {
        format!("{}/staging/apps/{}", self.base_url, app.id)
    }

    fn buildpack_cache_download_url(&self, app: &Application) -> Option<String> {
        // Nothing to restore before the first successful stage.
        app.detected_buildpack_key
            .as_ref()
            .map(|_| format!("{}/staging/buildpack_cache/{}/download", self.base_url, app.id))
    }

    fn buildpack_cache_upload_url(&self, app: &Application) -> String {
        format!("{}/staging/buildpack_cache/{}/upload", self.base_url, app.id)
    }

    fn droplet_upload_url(&self, app: &Application) -> String {
        format!("{}/staging/droplets/{}/upload", self.base_url, app.id)
    }

    fn droplet_download_url(&self, app: &Application) -> String {
        format!("{}/staging/droplets/{}/download", self.base_url, app.id)
    }

    fn admin_buildpack_download_url(&self, buildpack: &AdminBuildpack) -> String {
        format!("{}/v2/buildpacks/{}/download", self.base_url, buildpack.key)
    }
}
