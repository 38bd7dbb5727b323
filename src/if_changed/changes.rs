//! Sources of the changed-path set

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ChangedPathError {
    #[error("failed to read changed files list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to run git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("`git {command}` exited with code {code}: {stderr}")]
    Git {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("git output is not valid UTF-8")]
    Utf8,
}

/// Produces the list of files changed in the commit range being built
#[async_trait]
pub trait ChangedPathSource: Send + Sync {
    async fn changed_paths(&self) -> Result<Vec<String>, ChangedPathError>;
}

/// Changed paths from git: everything that differs from the merge base with
/// `base`
#[derive(Debug, Clone)]
pub struct GitDiff {
    base: String,
    dir: Option<PathBuf>,
}

impl GitDiff {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            dir: None,
        }
    }

    /// Run git in `dir` instead of the current directory
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    async fn git(&self, args: &[&str]) -> Result<String, ChangedPathError> {
        let mut command = Command::new("git");
        command.args(args).kill_on_drop(true);
        if let Some(dir) = &self.dir {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(ChangedPathError::Spawn)?;
        if !output.status.success() {
            return Err(ChangedPathError::Git {
                command: args.join(" "),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        String::from_utf8(output.stdout).map_err(|_| ChangedPathError::Utf8)
    }
}

#[async_trait]
impl ChangedPathSource for GitDiff {
    async fn changed_paths(&self) -> Result<Vec<String>, ChangedPathError> {
        let merge_base = self.git(&["merge-base", &self.base, "HEAD"]).await?;
        let merge_base = merge_base.trim();
        debug!(base = %self.base, merge_base, "Resolved merge base");

        let diff = self.git(&["diff", "--name-only", merge_base]).await?;
        Ok(split_paths(&diff))
    }
}

/// A fixed list of changed paths
#[derive(Debug, Clone, Default)]
pub struct FixedPaths(pub Vec<String>);

#[async_trait]
impl ChangedPathSource for FixedPaths {
    async fn changed_paths(&self) -> Result<Vec<String>, ChangedPathError> {
        Ok(self.0.clone())
    }
}

/// Read a newline separated list of paths, ignoring blank lines
pub async fn read_changed_files(path: &Path) -> Result<Vec<String>, ChangedPathError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ChangedPathError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(split_paths(&content))
}

fn split_paths(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
