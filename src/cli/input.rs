//! Locating and reading the pipeline document

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Files tried, in order, when no pipeline file is given
pub const DEFAULT_PIPELINE_PATHS: &[&str] = &[
    ".ci-agent/pipeline.yml",
    ".ci-agent/pipeline.yaml",
    ".ci-agent/pipeline.json",
    "ci-agent.yml",
    "ci-agent.yaml",
    "ci-agent.json",
];

#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to read {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no pipeline file found, looked for: {}", .searched.join(", "))]
    NotFound { searched: Vec<String> },
}

/// Raw pipeline bytes and where they came from
#[derive(Debug, Clone)]
pub struct PipelineInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Read the pipeline from `file`, stdin (`-`), or the first default path
/// that exists under `root`
pub async fn read_pipeline(file: Option<&Path>, root: &Path) -> Result<PipelineInput, InputError> {
    match file {
        Some(path) if path == Path::new("-") => {
            let mut bytes = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut bytes)
                .await
                .map_err(|source| InputError::Read {
                    name: "stdin".to_string(),
                    source,
                })?;
            Ok(PipelineInput {
                name: "(stdin)".to_string(),
                bytes,
            })
        }
        Some(path) => read_file(path.to_path_buf()).await,
        None => {
            let path = find_default(root).ok_or_else(|| InputError::NotFound {
                searched: DEFAULT_PIPELINE_PATHS.iter().map(|p| p.to_string()).collect(),
            })?;
            read_file(path).await
        }
    }
}

fn find_default(root: &Path) -> Option<PathBuf> {
    DEFAULT_PIPELINE_PATHS
        .iter()
        .map(|candidate| root.join(candidate))
        .find(|path| path.is_file())
}

async fn read_file(path: PathBuf) -> Result<PipelineInput, InputError> {
    let name = path.display().to_string();
    debug!(path = %name, "Reading pipeline file");
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|source| InputError::Read {
            name: name.clone(),
            source,
        })?;
    Ok(PipelineInput { name, bytes })
}
