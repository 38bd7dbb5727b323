//! Test utility functions for ci-agent

#![allow(dead_code)]

use async_trait::async_trait;
use ci_agent::core::config::AgentConfig;
use ci_agent::if_changed::{FixedPaths, IfChangedApplicator};
use ci_agent::upload::{
    ApiError, BackoffPolicy, PipelineChange, PipelineUploader, RetryPolicy, UploadDriver,
    UploadResponse,
};
use ci_agent::{Environment, RunContext, UploadEngine};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Mock uploader that replays scripted results and records every attempt
#[derive(Default)]
pub struct MockUploader {
    script: Mutex<VecDeque<Result<UploadResponse, ApiError>>>,
    attempts: Mutex<Vec<(String, PipelineChange)>>,
}

impl MockUploader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Results returned in order; once exhausted every attempt succeeds
    pub fn with_script(script: Vec<Result<UploadResponse, ApiError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            attempts: Mutex::new(Vec::new()),
        })
    }

    /// Every (job id, change) seen, in order
    pub fn attempts(&self) -> Vec<(String, PipelineChange)> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn changes(&self) -> Vec<PipelineChange> {
        self.attempts().into_iter().map(|(_, c)| c).collect()
    }
}

#[async_trait]
impl PipelineUploader for MockUploader {
    async fn upload(
        &self,
        job_id: &str,
        change: &PipelineChange,
    ) -> Result<UploadResponse, ApiError> {
        self.attempts
            .lock()
            .unwrap()
            .push((job_id.to_string(), change.clone()));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(UploadResponse { status: 201 }))
    }
}

pub fn server_error() -> Result<UploadResponse, ApiError> {
    Err(ApiError::Status {
        status: 502,
        message: "bad gateway".to_string(),
    })
}

pub fn status_error(status: u16) -> Result<UploadResponse, ApiError> {
    Err(ApiError::Status {
        status,
        message: format!("status {}", status),
    })
}

/// Build an engine uploading to `uploader`, with changed files fixed to
/// `changed` and retries without delay
pub fn engine(
    config: AgentConfig,
    ctx: RunContext,
    uploader: Arc<MockUploader>,
    changed: &[&str],
) -> UploadEngine {
    let applicator = IfChangedApplicator::new(
        config.apply_if_changed,
        config.changed_files_path.clone(),
        Box::new(FixedPaths(changed.iter().map(|s| s.to_string()).collect())),
    );
    let driver = UploadDriver::new(
        uploader,
        RetryPolicy::new(config.upload_attempts, BackoffPolicy::None),
    );
    UploadEngine::new(config, ctx, applicator).with_driver(driver)
}

pub fn env(pairs: &[(&str, &str)]) -> Environment {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// The command of the step at `index` in an uploaded pipeline body
pub fn command_at(change: &PipelineChange, index: usize) -> String {
    change.pipeline["steps"][index]["command"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}
