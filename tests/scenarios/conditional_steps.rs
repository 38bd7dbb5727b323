//! Test: Conditional Steps With if_changed
//!
//! Steps gated on changed files are skipped or kept before upload, and the
//! `if_changed` key never reaches the server.

use crate::helpers::*;
use ci_agent::core::config::AgentConfig;
use ci_agent::if_changed::SKIP_MESSAGE;
use ci_agent::{RunContext, RunMode};
use serde_json::Value;
use std::io::Write;

const PIPELINE: &[u8] = br#"
steps:
  - label: backend
    command: go test ./...
    if_changed:
      include: "foo/**"
      exclude: "foo/baz"
  - label: docs
    command: make docs
    if_changed: "docs/**"
  - group: deploy
    if_changed: ["deploy/**", "charts/**"]
    steps:
      - command: helm upgrade
        if_changed: "charts/**"
  - trigger: downstream
    if_changed: "api/*.proto"
  - label: always
    command: echo hi
"#;

fn upload_mode() -> RunMode {
    RunMode::Upload {
        job_id: "job".to_string(),
    }
}

fn skip(step: &Value) -> Option<&str> {
    step.get("skip").and_then(Value::as_str)
}

async fn uploaded_steps(config: AgentConfig, changed: &[&str]) -> Vec<Value> {
    let uploader = MockUploader::new();
    let mut engine = engine(config, RunContext::default(), uploader.clone(), changed);
    engine
        .run(&upload_mode(), PIPELINE, &env(&[]), "pipeline.yml")
        .await
        .unwrap();

    let change = uploader.changes().remove(0);
    let steps = change.pipeline["steps"].as_array().unwrap().clone();
    for step in &steps {
        assert!(step.get("if_changed").is_none(), "if_changed leaked: {}", step);
    }
    steps
}

#[tokio::test]
async fn test_excluded_path_skips() {
    let steps = uploaded_steps(AgentConfig::default(), &["foo/baz"]).await;
    assert_eq!(skip(&steps[0]), Some(SKIP_MESSAGE));
}

#[tokio::test]
async fn test_included_path_alongside_excluded_runs() {
    let steps = uploaded_steps(AgentConfig::default(), &["foo/hello.go", "foo/baz"]).await;
    assert_eq!(skip(&steps[0]), None);
    assert_eq!(skip(&steps[1]), Some(SKIP_MESSAGE));
    assert_eq!(skip(&steps[4]), None);
}

#[tokio::test]
async fn test_skipped_group_children_are_not_annotated() {
    let steps = uploaded_steps(AgentConfig::default(), &["docs/index.md"]).await;

    let group = &steps[2];
    assert_eq!(skip(group), Some(SKIP_MESSAGE));
    let child = &group["steps"][0];
    assert!(child.get("if_changed").is_none());
    assert_eq!(skip(child), None);

    assert_eq!(skip(&steps[1]), None);
    assert_eq!(skip(&steps[3]), Some(SKIP_MESSAGE));
}

#[tokio::test]
async fn test_running_group_filters_children() {
    let steps = uploaded_steps(AgentConfig::default(), &["deploy/app.yaml"]).await;
    let group = &steps[2];
    assert_eq!(skip(group), None);
    assert_eq!(skip(&group["steps"][0]), Some(SKIP_MESSAGE));
}

#[tokio::test]
async fn test_disabled_filter_strips_only() {
    let config = AgentConfig {
        apply_if_changed: false,
        ..AgentConfig::default()
    };
    let steps = uploaded_steps(config, &[]).await;
    assert!(steps.iter().all(|step| skip(step).is_none()));
    assert!(skip(&steps[2]["steps"][0]).is_none());
}

#[tokio::test]
async fn test_changed_files_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "api/users.proto").unwrap();
    writeln!(file).unwrap();
    writeln!(file, "docs/guide.md").unwrap();

    let config = AgentConfig {
        changed_files_path: Some(file.path().to_path_buf()),
        ..AgentConfig::default()
    };
    // The fixed source would say nothing changed; the file wins
    let steps = uploaded_steps(config, &[]).await;

    assert_eq!(skip(&steps[0]), Some(SKIP_MESSAGE));
    assert_eq!(skip(&steps[1]), None);
    assert_eq!(skip(&steps[3]), None);
}
