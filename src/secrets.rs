//! Detection of secret values baked into a pipeline
//!
//! After interpolation a pipeline can end up carrying the literal value of a
//! secret environment variable. Uploading it would publish the secret, so the
//! scanner looks for every redacted variable's value in the pipeline text.

use crate::core::{env::Environment, FieldBag, Pipeline, Step};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde_yaml::Value;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, PartialEq)]
#[error(
    "pipeline {display_name:?} contains values interpolated from the following secret environment variables: {}",
    .names.join(", ")
)]
pub struct SecretLeakError {
    /// Offending variable names, sorted and de-duplicated
    pub names: Vec<String>,
    pub display_name: String,
}

/// Search `pipeline` for the values of redacted variables from `env`.
///
/// `patterns` are case-insensitive globs over variable names. A value that
/// starts with `$` is itself an unresolved reference and never counts as a
/// leak.
pub fn search_for_secrets(
    patterns: &[String],
    env: &Environment,
    pipeline: &Pipeline,
    display_name: &str,
) -> Result<(), SecretLeakError> {
    let matcher = redacted_matcher(patterns);

    let mut candidates: Vec<(&str, &str)> = env
        .iter()
        .filter(|(name, value)| {
            !value.is_empty() && !value.starts_with('$') && matcher.is_match(name.as_str())
        })
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    if candidates.is_empty() {
        return Ok(());
    }
    candidates.sort_unstable();

    let texts = pipeline_texts(pipeline);
    debug!(
        candidates = candidates.len(),
        texts = texts.len(),
        "Scanning pipeline for secrets"
    );

    let mut names: Vec<String> = candidates
        .iter()
        .filter(|(_, value)| texts.iter().any(|text| text.contains(value)))
        .map(|(name, _)| name.to_string())
        .collect();
    names.dedup();

    if names.is_empty() {
        Ok(())
    } else {
        Err(SecretLeakError {
            names,
            display_name: display_name.to_string(),
        })
    }
}

fn redacted_matcher(patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match GlobBuilder::new(pattern).case_insensitive(true).build() {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => warn!(pattern = %pattern, error = %e, "Ignoring invalid redacted variable pattern"),
        }
    }
    builder.build().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to build redacted variable matcher");
        GlobSet::empty()
    })
}

/// Every piece of text in the pipeline a secret could hide in
fn pipeline_texts(pipeline: &Pipeline) -> Vec<&str> {
    let mut texts = Vec::new();
    if let Some(env) = &pipeline.env {
        texts.extend(env.values());
    }
    for step in &pipeline.steps {
        step_texts(step, &mut texts);
    }
    texts
}

fn step_texts<'a>(step: &'a Step, texts: &mut Vec<&'a str>) {
    if let Step::Command(command) = step {
        texts.push(command.command.as_str());
        if let Some(env) = &command.env {
            texts.extend(env.values());
        }
    }
    for value in step.fields().values() {
        value_texts(value, texts);
    }
    for child in step.children() {
        step_texts(child, texts);
    }
}

fn value_texts<'a>(value: &'a Value, texts: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => texts.push(s),
        Value::Sequence(items) => items.iter().for_each(|v| value_texts(v, texts)),
        Value::Mapping(mapping) => mapping.values().for_each(|v| value_texts(v, texts)),
        Value::Tagged(tagged) => value_texts(&tagged.value, texts),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Environment {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn pipeline(yaml: &str) -> Pipeline {
        Pipeline::from_value(serde_yaml::from_str(yaml).unwrap()).unwrap()
    }

    fn patterns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_literal_secret_in_command() {
        let p = pipeline("steps:\n  - command: echo squirrel");
        let err = search_for_secrets(
            &patterns(&["SEKRET"]),
            &env(&[("SEKRET", "squirrel")]),
            &p,
            "pipeline.yml",
        )
        .unwrap_err();

        assert_eq!(err.names, vec!["SEKRET".to_string()]);
        assert_eq!(err.display_name, "pipeline.yml");
        assert!(err.to_string().contains("SEKRET"));
    }

    #[test]
    fn test_runtime_reference_is_not_a_leak() {
        let p = pipeline("steps:\n  - command: echo $SQUIRREL");
        let result = search_for_secrets(
            &patterns(&["SEKRET"]),
            &env(&[("SEKRET", "squirrel")]),
            &p,
            "pipeline.yml",
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_value_that_is_an_expression_is_ignored() {
        let p = pipeline("steps:\n  - command: echo ${OTHER}");
        let result = search_for_secrets(
            &patterns(&["*_TOKEN"]),
            &env(&[("API_TOKEN", "${OTHER}")]),
            &p,
            "stdin",
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_all_matches_sorted() {
        let p = pipeline(
            r#"
env:
  DEPLOY: "hunter2"
steps:
  - group: g
    steps:
      - command: run
        env:
          KEY: s3cr3t
      - trigger: deploy
        build:
          message: "with hunter2"
"#,
        );
        let err = search_for_secrets(
            &patterns(&["*_PASSWORD", "*_KEY"]),
            &env(&[
                ("DB_PASSWORD", "hunter2"),
                ("SSH_KEY", "s3cr3t"),
                ("UNRELATED", "run"),
            ]),
            &p,
            "pipeline.yml",
        )
        .unwrap_err();

        assert_eq!(err.names, vec!["DB_PASSWORD".to_string(), "SSH_KEY".to_string()]);
    }

    #[test]
    fn test_patterns_are_case_insensitive() {
        let p = pipeline("steps:\n  - command: curl -H token=abc123");
        let err = search_for_secrets(
            &patterns(&["*_token"]),
            &env(&[("Api_Token", "abc123")]),
            &p,
            "pipeline.yml",
        )
        .unwrap_err();
        assert_eq!(err.names, vec!["Api_Token".to_string()]);
    }

    #[test]
    fn test_empty_values_and_invalid_patterns() {
        let p = pipeline("steps:\n  - command: echo");
        let result = search_for_secrets(
            &patterns(&["[", "EMPTY"]),
            &env(&[("EMPTY", "")]),
            &p,
            "pipeline.yml",
        );
        assert!(result.is_ok());
    }
}
