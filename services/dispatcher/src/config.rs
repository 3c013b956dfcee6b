//! Process-wide configuration snapshot.
//!
//! Loaded once at startup and shared read-only as `Arc<DispatchConfig>`.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Default stack for applications that do not name one.
pub const DEFAULT_STACK: &str = "cflinuxfs2";

/// Default ceiling on a single staging attempt.
pub const DEFAULT_MAX_STAGING_RUNTIME: Duration = Duration::from_secs(120);

/// Whether the declarative scheduler may be used for a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiegoMode {
    /// Apps asking for the declarative scheduler are rejected.
    #[default]
    Disabled,
    /// Apps choose per their desire flag.
    Optional,
}

impl FromStr for DiegoMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" => Ok(DiegoMode::Disabled),
            "optional" => Ok(DiegoMode::Optional),
            other => anyhow::bail!("unknown diego mode '{other}', expected 'disabled' or 'optional'"),
        }
    }
}

impl std::fmt::Display for DiegoMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiegoMode::Disabled => write!(f, "disabled"),
            DiegoMode::Optional => write!(f, "optional"),
        }
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Whether docker images may be staged.
    pub diego_docker: bool,

    /// Mode governing where apps are staged.
    pub staging: DiegoMode,

    /// Mode governing where apps are run.
    pub running: DiegoMode,

    /// Ceiling on a single staging attempt; also the grace period before
    /// replaced buildpack bits are deleted.
    pub max_staging_runtime: Duration,

    /// Base URL of the internal blobstore endpoints handed to schedulers.
    pub blobstore_url: String,

    /// Stack used when an app does not name one.
    pub default_stack: String,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            diego_docker: false,
            staging: DiegoMode::Disabled,
            running: DiegoMode::Disabled,
            max_staging_runtime: DEFAULT_MAX_STAGING_RUNTIME,
            blobstore_url: "http://127.0.0.1:9022".to_string(),
            default_stack: DEFAULT_STACK.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl DispatchConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let diego_docker = lookup("CCD_DIEGO_DOCKER")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(defaults.diego_docker);

        let staging = match lookup("CCD_DIEGO_STAGING") {
            Some(v) => v.parse().context("invalid CCD_DIEGO_STAGING")?,
            None => defaults.staging,
        };

        let running = match lookup("CCD_DIEGO_RUNNING") {
            Some(v) => v.parse().context("invalid CCD_DIEGO_RUNNING")?,
            None => defaults.running,
        };

        let max_staging_runtime = lookup("CCD_MAX_STAGING_RUNTIME")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.max_staging_runtime);

        let blobstore_url = lookup("CCD_BLOBSTORE_URL").unwrap_or(defaults.blobstore_url);
        let default_stack = lookup("CCD_DEFAULT_STACK").unwrap_or(defaults.default_stack);
        let log_level = lookup("CCD_LOG_LEVEL").unwrap_or(defaults.log_level);

        Ok(Self {
            diego_docker,
            staging,
            running,
            max_staging_runtime,
            blobstore_url,
            default_stack,
            log_level,
        })
    }

    /// Staging timeout handed to schedulers, in whole seconds.
    pub fn staging_timeout_secs(&self) -> u64 {
        self.max_staging_runtime.as_secs()
    }
}
