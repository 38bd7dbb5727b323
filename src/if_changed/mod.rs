//! Conditional steps based on which files changed
//!
//! A step may carry an `if_changed` key holding glob patterns. When the
//! applicator is enabled, steps whose patterns match none of the changed
//! files gain a `skip` key; the `if_changed` key itself is always removed
//! before upload.
//!
//! ```yaml
//! steps:
//!   - command: make docs
//!     if_changed: "docs/**"
//!   - command: go test ./...
//!     if_changed:
//!       include: ["**/*.go", "go.mod"]
//!       exclude: "vendor/**"
//! ```

pub mod changes;

pub use changes::{
    read_changed_files, ChangedPathError, ChangedPathSource, FixedPaths, GitDiff,
};

use crate::core::{config::AgentConfig, env::describe, FieldBag, Step};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde_yaml::Value;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const IF_CHANGED: &str = "if_changed";

/// Value of the `skip` key added to steps that will not run
pub const SKIP_MESSAGE: &str = "if_changed: no matching files changed";

/// Why an `if_changed` value could not be understood
#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("expected a glob, a list of globs or a mapping with `include`, got {0}")]
    InvalidShape(String),

    #[error("mapping form requires an `include` key")]
    MissingInclude,

    #[error("unexpected key {0:?}, only `include` and `exclude` are allowed")]
    UnknownKey(String),

    #[error("invalid glob {pattern:?}: {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// A compiled `if_changed` condition
#[derive(Debug)]
pub struct Condition {
    include: GlobSet,
    exclude: GlobSet,
}

impl Condition {
    /// Compile an `if_changed` value: a glob, a list of globs, or
    /// `{include, exclude}` where each side is a glob or a list
    pub fn from_value(value: &Value) -> Result<Self, ConditionError> {
        match value {
            Value::Mapping(mapping) => {
                if let Some(key) = mapping
                    .keys()
                    .find(|k| !matches!(k.as_str(), Some("include") | Some("exclude")))
                {
                    return Err(ConditionError::UnknownKey(
                        key.as_str().map(str::to_string).unwrap_or_else(|| format!("{:?}", key)),
                    ));
                }
                let include = mapping.get("include").ok_or(ConditionError::MissingInclude)?;
                let exclude = match mapping.get("exclude") {
                    Some(exclude) => glob_set(exclude)?,
                    None => GlobSet::empty(),
                };
                Ok(Self {
                    include: glob_set(include)?,
                    exclude,
                })
            }
            other => Ok(Self {
                include: glob_set(other)?,
                exclude: GlobSet::empty(),
            }),
        }
    }

    /// Some changed path matches an include pattern without also matching
    /// an exclude pattern
    pub fn should_run(&self, changed: &[String]) -> bool {
        changed
            .iter()
            .any(|path| self.include.is_match(path) && !self.exclude.is_match(path))
    }
}

fn glob_set(value: &Value) -> Result<GlobSet, ConditionError> {
    let patterns: Vec<&str> = match value {
        Value::String(pattern) => vec![pattern.as_str()],
        Value::Sequence(items) => items
            .iter()
            .map(|item| {
                item.as_str().ok_or_else(|| {
                    ConditionError::InvalidShape(format!("a list containing {}", describe(item)))
                })
            })
            .collect::<Result<_, _>>()?,
        other => return Err(ConditionError::InvalidShape(describe(other))),
    };

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|source| ConditionError::InvalidGlob {
                pattern: pattern.to_string(),
                source,
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| ConditionError::InvalidGlob {
        pattern: String::new(),
        source,
    })
}

/// Evaluates `if_changed` on a step tree.
///
/// The changed-path set is gathered at most once per applicator, and only
/// when some step actually carries `if_changed`.
pub struct IfChangedApplicator {
    enabled: bool,
    gathered: bool,
    changed_paths: Vec<String>,
    changed_files_path: Option<PathBuf>,
    source: Box<dyn ChangedPathSource>,
}

impl IfChangedApplicator {
    /// `changed_files_path`, when set, takes precedence over `source`
    pub fn new(
        enabled: bool,
        changed_files_path: Option<PathBuf>,
        source: Box<dyn ChangedPathSource>,
    ) -> Self {
        Self {
            enabled,
            gathered: false,
            changed_paths: Vec::new(),
            changed_files_path,
            source,
        }
    }

    /// Applicator for one upload run: changed files come from
    /// `changed_files_path` if set, otherwise from git
    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(
            config.apply_if_changed,
            config.changed_files_path.clone(),
            Box::new(GitDiff::new(config.git_diff_base.clone())),
        )
    }

    /// An applicator that only strips `if_changed` keys
    pub fn disabled() -> Self {
        Self::new(false, None, Box::new(FixedPaths::default()))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn gathered(&self) -> bool {
        self.gathered
    }

    pub fn changed_paths(&self) -> &[String] {
        &self.changed_paths
    }

    /// Evaluate and strip `if_changed` on every step, recursively
    pub async fn apply(&mut self, steps: &mut [Step]) {
        if self.enabled && !self.gathered && has_conditions(steps) {
            self.gather().await;
        }

        let changed = if self.enabled {
            Some(self.changed_paths.as_slice())
        } else {
            None
        };
        apply_steps(steps, changed);
    }

    async fn gather(&mut self) {
        self.gathered = true;

        let result = match &self.changed_files_path {
            Some(path) => read_changed_files(path).await,
            None => self.source.changed_paths().await,
        };

        match result {
            Ok(paths) => {
                info!(count = paths.len(), "Gathered changed files");
                debug!(paths = ?paths, "Changed files");
                self.changed_paths = paths;
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to gather changed files, all if_changed conditions will be ignored"
                );
                self.enabled = false;
            }
        }
    }
}

fn has_conditions(steps: &[Step]) -> bool {
    steps
        .iter()
        .any(|step| step.has_field(IF_CHANGED) || has_conditions(step.children()))
}

/// `changed` is `None` when conditions are only stripped, not evaluated
fn apply_steps(steps: &mut [Step], changed: Option<&[String]>) {
    for step in steps.iter_mut() {
        let skip = match (step.remove_field(IF_CHANGED), changed) {
            (Some(value), Some(paths)) => !evaluate(step, &value, paths),
            _ => false,
        };

        if skip {
            step.set_field("skip", Value::String(SKIP_MESSAGE.to_string()));
        }

        if let Step::Group(group) = step {
            // Children of a skipped group never run, so they are only stripped
            apply_steps(&mut group.steps, if skip { None } else { changed });
        }
    }
}

/// Whether the step should run. Conditions that cannot be understood let the
/// step run.
fn evaluate(step: &Step, value: &Value, changed: &[String]) -> bool {
    match Condition::from_value(value) {
        Ok(condition) => {
            let run = condition.should_run(changed);
            debug!(step = %step.label(), run, "Evaluated if_changed");
            run
        }
        Err(e) => {
            warn!(
                step = %step.label(),
                error = %e,
                "Ignoring invalid if_changed, the step will run"
            );
            true
        }
    }
}
