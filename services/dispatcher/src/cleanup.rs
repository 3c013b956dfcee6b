//! Deferred deletion of replaced buildpack bits.
//!
//! A staging attempt already in flight may still download the old bits, so
//! deletion is scheduled no sooner than one maximum staging runtime from now.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::DispatchConfig;

/// Queue that generic background jobs are placed on.
pub const GENERIC_QUEUE: &str = "cc-generic";

/// Errors returned by the job queue.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobQueueError {
    #[error("failed to enqueue job: {0}")]
    Enqueue(String),
}

/// Deletes one blob from a named blobstore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobstoreDeleteJob {
    pub key: String,
    pub blobstore_name: String,
}

/// When and where a job runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueOptions {
    pub queue: String,
    pub run_at: DateTime<Utc>,
}

/// Background job scheduling seam.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(
        &self,
        job: BlobstoreDeleteJob,
        options: EnqueueOptions,
    ) -> Result<(), JobQueueError>;
}

pub struct BuildpackBitsDelete;

impl BuildpackBitsDelete {
    /// Schedule deletion of `blobstore_key` once no staging attempt can still
    /// need it. Without a key there is nothing to delete.
    pub async fn delete_when_safe(
        blobstore_key: Option<&str>,
        blobstore_name: &str,
        config: &DispatchConfig,
        jobs: &dyn JobQueue,
    ) -> Result<(), JobQueueError> {
        let Some(key) = blobstore_key else {
            return Ok(());
        };

        let run_at = Self::run_at(Utc::now(), config);
        info!(key, blobstore_name, %run_at, "Scheduling buildpack bits deletion");

        jobs.enqueue(
            BlobstoreDeleteJob {
                key: key.to_string(),
                blobstore_name: blobstore_name.to_string(),
            },
            EnqueueOptions {
                queue: GENERIC_QUEUE.to_string(),
                run_at,
            },
        )
        .await
    }

    fn run_at(now: DateTime<Utc>, config: &DispatchConfig) -> DateTime<Utc> {
        let grace = chrono::Duration::from_std(config.max_staging_runtime)
            .unwrap_or_else(|_| chrono::Duration::seconds(120));
        now + grace
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    #[derive(Default)]
    struct RecordingQueue {
        jobs: Mutex<Vec<(BlobstoreDeleteJob, EnqueueOptions)>>,
    }

    #[async_trait]
    impl JobQueue for RecordingQueue {
        async fn enqueue(
            &self,
            job: BlobstoreDeleteJob,
            options: EnqueueOptions,
        ) -> Result<(), JobQueueError> {
            self.jobs.lock().unwrap().push((job, options));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_no_key_enqueues_nothing() {
        let queue = RecordingQueue::default();
        BuildpackBitsDelete::delete_when_safe(None, "buildpack_blobstore", &DispatchConfig::default(), &queue)
            .await
            .unwrap();
        assert!(queue.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enqueues_after_staging_timeout() {
        let queue = RecordingQueue::default();
        let config = DispatchConfig {
            max_staging_runtime: Duration::from_secs(300),
            ..Default::default()
        };

        let before = Utc::now();
        BuildpackBitsDelete::delete_when_safe(Some("bp-key"), "buildpack_blobstore", &config, &queue)
            .await
            .unwrap();

        let jobs = queue.jobs.lock().unwrap();
        assert_eq!(jobs.len(), 1);
        let (job, options) = &jobs[0];
        assert_eq!(job.key, "bp-key");
        assert_eq!(job.blobstore_name, "buildpack_blobstore");
        assert_eq!(options.queue, GENERIC_QUEUE);
        assert!(options.run_at >= before + chrono::Duration::seconds(300));
        assert!(options.run_at <= Utc::now() + chrono::Duration::seconds(300));
    }

    #[test]
    fn test_default_grace_is_two_minutes() {
        let now = Utc::now();
        let run_at = BuildpackBitsDelete::run_at(now, &DispatchConfig::default());
        assert_eq!(run_at - now, chrono::Duration::seconds(120));
    }
}
