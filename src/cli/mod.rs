//! Command-line interface

pub mod commands;
pub mod input;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{UploadCommand, ValidateCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Build agent pipeline tooling
#[derive(Debug, Parser, Clone)]
#[command(name = "ci-agent")]
#[command(version)]
#[command(about = "Upload dynamic pipelines from a running build job", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to agent configuration file (YAML)
    #[arg(short, long, global = true, env = "CI_AGENT_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Parse, filter and upload a pipeline to the running job
    Upload(UploadCommand),

    /// Parse, interpolate and scan a pipeline without uploading it
    Validate(ValidateCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
