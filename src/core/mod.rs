//! Core domain models for pipeline uploads
//!
//! This module defines the pipeline and step structures, ordered
//! environment maps, agent configuration and the per-run context.

pub mod config;
pub mod context;
pub mod env;
pub mod pipeline;
pub mod step;

pub use context::*;
pub use env::{EnvMap, Environment};
pub use pipeline::*;
pub use step::*;
