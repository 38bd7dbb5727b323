//! Upload engine - runs every pipeline document through parse, scan, filter
//! and upload

use crate::{
    core::{config::AgentConfig, env::Environment, Pipeline, RunContext},
    if_changed::IfChangedApplicator,
    parse::{parse_and_interpolate, ParseError},
    secrets::{search_for_secrets, SecretLeakError},
    upload::{UploadDriver, UploadError, UploadReceipt},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Events that can occur while processing pipeline documents
#[derive(Debug, Clone)]
pub enum UploadEvent {
    DocumentParsed {
        document: usize,
        steps: usize,
    },
    StepsFiltered {
        document: usize,
        skipped: usize,
    },
    UploadStarted {
        document: usize,
        filename: String,
    },
    UploadCompleted {
        document: usize,
        receipt: UploadReceipt,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(UploadEvent) + Send + Sync>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("document {document}: {source}")]
    SecretLeak {
        document: usize,
        #[source]
        source: SecretLeakError,
    },

    #[error("document {document}: {source}")]
    Upload {
        document: usize,
        #[source]
        source: UploadError,
    },

    #[error("no pipeline documents found in {0}")]
    NoDocuments(String),

    #[error("no uploader configured, set an endpoint or use a dry run")]
    NoUploader,

    #[error("cancelled")]
    Cancelled,
}

/// What to do with each processed document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Filter and upload to the given job
    Upload { job_id: String },
    /// Filter but keep the result instead of uploading
    DryRun,
    /// Parse and scan only
    Validate,
}

/// Outcome of a run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub documents: usize,
    /// Processed pipelines, in document order
    pub pipelines: Vec<Pipeline>,
    pub receipts: Vec<UploadReceipt>,
}

impl RunSummary {
    pub fn step_count(&self) -> usize {
        self.pipelines.iter().map(Pipeline::step_count).sum()
    }
}

/// Processes pipeline documents one at a time, stopping at the first error
pub struct UploadEngine {
    config: AgentConfig,
    ctx: RunContext,
    applicator: IfChangedApplicator,
    driver: Option<UploadDriver>,
    event_handlers: Vec<EventHandler>,
}

impl UploadEngine {
    pub fn new(config: AgentConfig, ctx: RunContext, applicator: IfChangedApplicator) -> Self {
        Self {
            config,
            ctx,
            applicator,
            driver: None,
            event_handlers: Vec::new(),
        }
    }

    pub fn with_driver(mut self, driver: UploadDriver) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(UploadEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    fn emit_event(&self, event: UploadEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Run every document in `input`.
    ///
    /// `source` names where the input came from; it is the display name for
    /// secret errors and the filename sent with uploads.
    pub async fn run(
        &mut self,
        mode: &RunMode,
        input: &[u8],
        env: &Environment,
        source: &str,
    ) -> Result<RunSummary, EngineError> {
        let driver = match mode {
            RunMode::Upload { .. } => Some(self.driver.clone().ok_or(EngineError::NoUploader)?),
            RunMode::DryRun | RunMode::Validate => None,
        };
        let scan = self.config.reject_secrets || *mode == RunMode::Validate;

        info!(source, mode = ?mode, "Processing pipeline");
        let mut summary = RunSummary::default();

        // The stream borrows the context, so it gets its own copy
        let ctx = self.ctx.clone();
        let documents = parse_and_interpolate(&ctx, input, env, self.config.interpolate);

        for parsed in documents {
            let mut pipeline = parsed?;
            let document = summary.documents + 1;
            summary.documents = document;
            self.emit_event(UploadEvent::DocumentParsed {
                document,
                steps: pipeline.step_count(),
            });

            if self.ctx.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            if scan {
                search_for_secrets(&self.config.redacted_vars, env, &pipeline, source)
                    .map_err(|source| EngineError::SecretLeak { document, source })?;
            }

            if *mode == RunMode::Validate {
                summary.pipelines.push(pipeline);
                continue;
            }

            self.applicator.apply(&mut pipeline.steps).await;
            let skipped = pipeline.skipped_count();
            debug!(document, skipped, "Applied if_changed");
            self.emit_event(UploadEvent::StepsFiltered { document, skipped });

            if let (Some(driver), RunMode::Upload { job_id }) = (&driver, mode) {
                self.emit_event(UploadEvent::UploadStarted {
                    document,
                    filename: source.to_string(),
                });
                let receipt = driver
                    .upload(&self.ctx, job_id, &pipeline, source, self.config.replace)
                    .await
                    .map_err(|source| EngineError::Upload { document, source })?;
                self.emit_event(UploadEvent::UploadCompleted { document, receipt });
                summary.receipts.push(receipt);
            }

            summary.pipelines.push(pipeline);
        }

        if summary.documents == 0 {
            return Err(EngineError::NoDocuments(source.to_string()));
        }

        info!(
            documents = summary.documents,
            steps = summary.step_count(),
            uploaded = summary.receipts.len(),
            "Finished processing pipeline"
        );
        Ok(summary)
    }
}
