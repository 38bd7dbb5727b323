//! The upload interface and its HTTP implementation

use crate::upload::response::ApiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// A pipeline submitted to the server for a running job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineChange {
    /// Idempotency token, identical across retries of one upload
    pub uuid: Uuid,

    /// Serialized pipeline body
    pub pipeline: serde_json::Value,

    /// Where the pipeline came from, for display
    pub filename: String,

    /// Replace the rest of the build's pipeline instead of appending
    pub replace: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadResponse {
    pub status: u16,
}

/// Something that can deliver a pipeline change to the server
#[async_trait]
pub trait PipelineUploader: Send + Sync {
    async fn upload(
        &self,
        job_id: &str,
        change: &PipelineChange,
    ) -> Result<UploadResponse, ApiError>;
}

/// Uploads over the agent HTTP API
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpUploader {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, job_id: &str) -> String {
        format!("{}/jobs/{}/pipelines", self.endpoint, job_id)
    }
}

#[async_trait]
impl PipelineUploader for HttpUploader {
    async fn upload(
        &self,
        job_id: &str,
        change: &PipelineChange,
    ) -> Result<UploadResponse, ApiError> {
        let url = self.url(job_id);
        debug!(url = %url, uuid = %change.uuid, "Uploading pipeline");

        let mut request = self.client.post(&url).json(change);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Token {}", token));
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(UploadResponse {
                status: status.as_u16(),
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Err(ApiError::Status {
            status: status.as_u16(),
            message: extract_error_message(&body),
        })
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.trim().to_string())
}
