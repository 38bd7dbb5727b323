//! CLI command definitions

use crate::core::config::{AgentConfig, OutputFormat};
use clap::Args;
use std::path::PathBuf;

/// Upload a pipeline
#[derive(Debug, Args, Clone)]
pub struct UploadCommand {
    /// Pipeline file, `-` for stdin. Searched for in the default locations
    /// when omitted
    pub file: Option<PathBuf>,

    /// Job to add the pipeline to
    #[arg(long, env = "CI_AGENT_JOB_ID")]
    pub job: Option<String>,

    /// Agent API endpoint
    #[arg(long, env = "CI_AGENT_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Agent access token
    #[arg(long, env = "CI_AGENT_ACCESS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Replace the rest of the build's pipeline instead of appending to it
    #[arg(long)]
    pub replace: bool,

    /// Print the processed pipeline instead of uploading it
    #[arg(long)]
    pub dry_run: bool,

    /// Dry run output format
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Upload the pipeline without interpolating variables
    #[arg(long)]
    pub no_interpolation: bool,

    /// Refuse to upload pipelines that contain secret values
    #[arg(long, env = "CI_AGENT_REJECT_SECRETS")]
    pub reject_secrets: bool,

    /// Name patterns of secret environment variables (comma separated)
    #[arg(long, env = "CI_AGENT_REDACTED_VARS", value_delimiter = ',')]
    pub redacted_vars: Vec<String>,

    /// Evaluate `if_changed` on steps
    #[arg(long, env = "CI_AGENT_APPLY_IF_CHANGED", value_name = "BOOL")]
    pub apply_if_changed: Option<bool>,

    /// File listing changed paths, one per line, instead of asking git
    #[arg(long, env = "CI_AGENT_CHANGED_FILES_PATH")]
    pub changed_files_path: Option<PathBuf>,

    /// Ref to diff against when asking git for changed paths
    #[arg(long, env = "CI_AGENT_GIT_DIFF_BASE")]
    pub git_diff_base: Option<String>,

    /// Enable an experiment (repeatable)
    #[arg(long = "experiment", env = "CI_AGENT_EXPERIMENTS", value_delimiter = ',')]
    pub experiments: Vec<String>,
}

impl UploadCommand {
    /// Layer command line flags over `config`
    pub fn apply_to(&self, config: &mut AgentConfig) {
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = Some(endpoint.clone());
        }
        if let Some(token) = &self.token {
            config.token = Some(token.clone());
        }
        config.replace |= self.replace;
        config.dry_run |= self.dry_run;
        if let Some(format) = self.format {
            config.format = format.into();
        }
        if self.no_interpolation {
            config.interpolate = false;
        }
        config.reject_secrets |= self.reject_secrets;
        if !self.redacted_vars.is_empty() {
            config.redacted_vars = self.redacted_vars.clone();
        }
        if let Some(apply) = self.apply_if_changed {
            config.apply_if_changed = apply;
        }
        if let Some(path) = &self.changed_files_path {
            config.changed_files_path = Some(path.clone());
        }
        if let Some(base) = &self.git_diff_base {
            config.git_diff_base = base.clone();
        }
        extend_unique(&mut config.experiments, &self.experiments);
    }
}

/// Validate a pipeline
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Pipeline file, `-` for stdin. Searched for in the default locations
    /// when omitted
    pub file: Option<PathBuf>,

    /// Check the pipeline without interpolating variables
    #[arg(long)]
    pub no_interpolation: bool,

    /// Name patterns of secret environment variables (comma separated)
    #[arg(long, env = "CI_AGENT_REDACTED_VARS", value_delimiter = ',')]
    pub redacted_vars: Vec<String>,

    /// Enable an experiment (repeatable)
    #[arg(long = "experiment", env = "CI_AGENT_EXPERIMENTS", value_delimiter = ',')]
    pub experiments: Vec<String>,

    /// Print the parsed pipeline in this format
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,
}

impl ValidateCommand {
    pub fn apply_to(&self, config: &mut AgentConfig) {
        if self.no_interpolation {
            config.interpolate = false;
        }
        if !self.redacted_vars.is_empty() {
            config.redacted_vars = self.redacted_vars.clone();
        }
        if let Some(format) = self.format {
            config.format = format.into();
        }
        extend_unique(&mut config.experiments, &self.experiments);
    }
}

fn extend_unique(target: &mut Vec<String>, extra: &[String]) {
    for name in extra {
        if !target.contains(name) {
            target.push(name.clone());
        }
    }
}

/// Output format argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FormatArg {
    Json,
    Yaml,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Yaml => OutputFormat::Yaml,
        }
    }
}
