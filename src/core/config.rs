//! Agent configuration for pipeline uploads, loaded from YAML

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable name patterns treated as secret-bearing by default
pub const DEFAULT_REDACTED_VARS: &[&str] = &[
    "*_PASSWORD",
    "*_SECRET",
    "*_TOKEN",
    "*_PRIVATE_KEY",
    "*_ACCESS_KEY",
    "*_SECRET_KEY",
    "*_CONNECTION_STRING",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("retry attempts must be at least 1")]
    ZeroAttempts,
}

/// Output format for dry runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

/// Upload behaviour settings.
///
/// Every field has a default so a config file only needs the keys it
/// changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent API endpoint, required unless doing a dry run
    pub endpoint: Option<String>,

    /// Agent access token
    #[serde(skip_serializing)]
    pub token: Option<String>,

    /// Interpolate `$VAR` expressions before upload
    pub interpolate: bool,

    /// Name patterns of environment variables whose values are secret
    pub redacted_vars: Vec<String>,

    /// Refuse to upload pipelines that embed a secret value
    pub reject_secrets: bool,

    /// Evaluate `if_changed` on steps
    pub apply_if_changed: bool,

    /// Newline separated list of changed files to use instead of git
    pub changed_files_path: Option<PathBuf>,

    /// Ref to diff against when gathering changed files from git
    pub git_diff_base: String,

    /// Replace the rest of the build's pipeline instead of appending
    pub replace: bool,

    /// Print the processed pipeline instead of uploading it
    pub dry_run: bool,

    /// Dry run output format
    pub format: OutputFormat,

    /// Enabled experiment names
    pub experiments: Vec<String>,

    /// Maximum number of upload attempts per pipeline
    pub upload_attempts: usize,

    /// Base delay between upload attempts, in milliseconds
    pub upload_retry_delay_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: None,
            interpolate: true,
            redacted_vars: DEFAULT_REDACTED_VARS.iter().map(|s| s.to_string()).collect(),
            reject_secrets: false,
            apply_if_changed: true,
            changed_files_path: None,
            git_diff_base: "origin/main".to_string(),
            replace: false,
            dry_run: false,
            format: OutputFormat::default(),
            experiments: Vec::new(),
            upload_attempts: 5,
            upload_retry_delay_ms: 1000,
        }
    }
}

impl AgentConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: AgentConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upload_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(())
    }

    pub fn upload_retry_delay(&self) -> Duration {
        Duration::from_millis(self.upload_retry_delay_ms)
    }
}
