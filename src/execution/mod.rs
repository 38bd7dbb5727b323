//! Pipeline upload engine

pub mod engine;

pub use engine::{EngineError, EventHandler, RunMode, RunSummary, UploadEngine, UploadEvent};
