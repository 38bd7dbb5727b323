//! ci-agent - dynamic pipeline upload for build agents

pub mod cli;
pub mod core;
pub mod execution;
pub mod if_changed;
pub mod parse;
pub mod secrets;
pub mod upload;

// Re-export commonly used types
pub use crate::core::{
    config::AgentConfig, CancelSignal, Canceller, EnvMap, Environment, Experiments, FieldBag,
    Pipeline, RunContext, Step,
};
pub use execution::{EngineError, RunMode, RunSummary, UploadEngine, UploadEvent};
pub use if_changed::{ChangedPathSource, IfChangedApplicator};
pub use parse::{parse_and_interpolate, DocumentStream, ParseError};
pub use secrets::{search_for_secrets, SecretLeakError};
pub use upload::{HttpUploader, PipelineChange, PipelineUploader, UploadDriver, UploadError};
