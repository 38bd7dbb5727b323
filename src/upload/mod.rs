//! Idempotent, retrying pipeline upload

pub mod client;
pub mod response;
pub mod retry;

pub use client::{HttpUploader, PipelineChange, PipelineUploader, UploadResponse};
pub use response::{ApiError, UploadError};
pub use retry::{BackoffPolicy, RetryPolicy};

use crate::core::{Pipeline, RunContext};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of a successful upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReceipt {
    pub uuid: Uuid,
    pub status: u16,
    pub attempts: usize,
}

/// Drives a [`PipelineUploader`] under a [`RetryPolicy`]
#[derive(Clone)]
pub struct UploadDriver {
    uploader: Arc<dyn PipelineUploader>,
    policy: RetryPolicy,
}

impl UploadDriver {
    pub fn new(uploader: Arc<dyn PipelineUploader>, policy: RetryPolicy) -> Self {
        Self { uploader, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Upload one pipeline.
    ///
    /// A fresh idempotency token is generated per call and sent with every
    /// attempt, so the server can drop duplicates of a retried upload.
    pub async fn upload(
        &self,
        ctx: &RunContext,
        job_id: &str,
        pipeline: &Pipeline,
        filename: &str,
        replace: bool,
    ) -> Result<UploadReceipt, UploadError> {
        let change = PipelineChange {
            uuid: Uuid::new_v4(),
            pipeline: pipeline.to_json()?,
            filename: filename.to_string(),
            replace,
        };
        let max_attempts = self.policy.max_attempts.max(1);
        debug!(job_id, uuid = %change.uuid, filename, "Prepared pipeline change");

        let mut attempt = 0;
        loop {
            attempt += 1;
            if ctx.cancel.is_cancelled() {
                return Err(UploadError::Cancelled);
            }

            let result = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return Err(UploadError::Cancelled),
                result = self.uploader.upload(job_id, &change) => result,
            };

            let err = match result {
                Ok(response) => {
                    info!(
                        job_id,
                        uuid = %change.uuid,
                        status = response.status,
                        attempt,
                        "Pipeline uploaded"
                    );
                    return Ok(UploadReceipt {
                        uuid: change.uuid,
                        status: response.status,
                        attempts: attempt,
                    });
                }
                Err(err) if !err.is_retryable() => return Err(UploadError::Rejected(err)),
                Err(err) => err,
            };

            if attempt >= max_attempts {
                return Err(UploadError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = self.policy.backoff.delay_for_attempt(attempt - 1);
            warn!(
                job_id,
                uuid = %change.uuid,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Pipeline upload failed, retrying"
            );

            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return Err(UploadError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
