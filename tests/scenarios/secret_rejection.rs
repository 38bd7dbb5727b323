//! Test: Secret Rejection
//!
//! With secret rejection on, a pipeline that bakes in a redacted variable's
//! value is refused before anything is uploaded.

use crate::helpers::*;
use ci_agent::core::config::AgentConfig;
use ci_agent::{EngineError, RunContext, RunMode};

fn upload_mode() -> RunMode {
    RunMode::Upload {
        job_id: "job".to_string(),
    }
}

fn rejecting() -> AgentConfig {
    AgentConfig {
        reject_secrets: true,
        redacted_vars: vec!["SEKRET".to_string(), "*_TOKEN".to_string()],
        ..AgentConfig::default()
    }
}

#[tokio::test]
async fn test_interpolated_secret_is_rejected() {
    let uploader = MockUploader::new();
    let mut engine = engine(rejecting(), RunContext::default(), uploader.clone(), &[]);

    let err = engine
        .run(
            &upload_mode(),
            b"steps:\n  - command: deploy --key $SEKRET --token ${GITHUB_TOKEN}\n",
            &env(&[("SEKRET", "squirrel"), ("GITHUB_TOKEN", "ghp_abc")]),
            "pipeline.yml",
        )
        .await
        .unwrap_err();

    match &err {
        EngineError::SecretLeak { source, .. } => {
            assert_eq!(source.names, vec!["GITHUB_TOKEN", "SEKRET"]);
            assert_eq!(source.display_name, "pipeline.yml");
        }
        other => panic!("Expected secret leak, got {:?}", other),
    }
    assert!(err.to_string().contains("SEKRET"));
    assert!(uploader.attempts().is_empty());
}

#[tokio::test]
async fn test_escaped_reference_is_allowed() {
    let uploader = MockUploader::new();
    let mut engine = engine(rejecting(), RunContext::default(), uploader.clone(), &[]);

    // `$$SEKRET` survives interpolation as `$SEKRET` for the job to expand
    engine
        .run(
            &upload_mode(),
            b"steps:\n  - command: echo $$SEKRET\n",
            &env(&[("SEKRET", "squirrel")]),
            "pipeline.yml",
        )
        .await
        .unwrap();

    let changes = uploader.changes();
    assert_eq!(command_at(&changes[0], 0), "echo $SEKRET");
}

#[tokio::test]
async fn test_literal_secret_without_interpolation() {
    let uploader = MockUploader::new();
    let config = AgentConfig {
        interpolate: false,
        ..rejecting()
    };
    let mut engine = engine(config, RunContext::default(), uploader.clone(), &[]);

    let err = engine
        .run(
            &upload_mode(),
            b"env:\n  PASSWORD: squirrel\nsteps:\n  - command: echo\n",
            &env(&[("SEKRET", "squirrel")]),
            "stdin",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SecretLeak { document: 1, .. }));
}

#[tokio::test]
async fn test_leaks_uploaded_when_not_rejecting() {
    let uploader = MockUploader::new();
    let config = AgentConfig {
        reject_secrets: false,
        ..rejecting()
    };
    let mut engine = engine(config, RunContext::default(), uploader.clone(), &[]);

    engine
        .run(
            &upload_mode(),
            b"steps:\n  - command: echo $SEKRET\n",
            &env(&[("SEKRET", "squirrel")]),
            "pipeline.yml",
        )
        .await
        .unwrap();
    assert_eq!(command_at(&uploader.changes()[0], 0), "echo squirrel");
}
