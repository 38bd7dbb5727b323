//! Test: Idempotent Upload With Retries
//!
//! Each document is uploaded with its own idempotency token; retries of one
//! document reuse the token, terminal statuses stop immediately.

use crate::helpers::*;
use ci_agent::core::config::AgentConfig;
use ci_agent::upload::{ApiError, UploadError};
use ci_agent::{EngineError, RunContext, RunMode};

fn upload_mode() -> RunMode {
    RunMode::Upload {
        job_id: "0190-job".to_string(),
    }
}

const TWO_DOCUMENTS: &[u8] = br#"
steps:
  - label: build
    command: make build
---
steps:
  - label: test
    command: make test
"#;

#[tokio::test]
async fn test_flaky_server_reuses_token() {
    let uploader = MockUploader::with_script(vec![server_error(), server_error()]);
    let mut engine = engine(
        AgentConfig::default(),
        RunContext::default(),
        uploader.clone(),
        &[],
    );

    let summary = engine
        .run(&upload_mode(), TWO_DOCUMENTS, &env(&[]), "pipeline.yml")
        .await
        .unwrap();

    let attempts = uploader.attempts();
    assert_eq!(attempts.len(), 4);
    assert!(attempts.iter().all(|(job, _)| job == "0190-job"));

    // First document took three attempts with one token
    let first = &attempts[0].1.uuid;
    assert_eq!(&attempts[1].1.uuid, first);
    assert_eq!(&attempts[2].1.uuid, first);
    assert_eq!(command_at(&attempts[2].1, 0), "make build");

    // Second document got a token of its own
    assert_ne!(&attempts[3].1.uuid, first);
    assert_eq!(command_at(&attempts[3].1, 0), "make test");

    assert_eq!(summary.receipts[0].attempts, 3);
    assert_eq!(summary.receipts[1].attempts, 1);
}

#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let uploader = MockUploader::with_script(vec![status_error(401)]);
    let mut engine = engine(
        AgentConfig::default(),
        RunContext::default(),
        uploader.clone(),
        &[],
    );

    let err = engine
        .run(&upload_mode(), TWO_DOCUMENTS, &env(&[]), "pipeline.yml")
        .await
        .unwrap_err();

    match err {
        EngineError::Upload {
            document: 1,
            source: UploadError::Rejected(ApiError::Status { status, .. }),
        } => assert_eq!(status, 401),
        other => panic!("Expected rejected upload, got {:?}", other),
    }
    // The second document is never attempted
    assert_eq!(uploader.attempts().len(), 1);
}

#[tokio::test]
async fn test_budget_exhaustion_surfaces_last_error() {
    let uploader = MockUploader::with_script(vec![
        server_error(),
        status_error(503),
        Err(ApiError::Transport("connection reset by peer".to_string())),
    ]);
    let config = AgentConfig {
        upload_attempts: 3,
        ..AgentConfig::default()
    };
    let mut engine = engine(config, RunContext::default(), uploader.clone(), &[]);

    let err = engine
        .run(&upload_mode(), TWO_DOCUMENTS, &env(&[]), "pipeline.yml")
        .await
        .unwrap_err();

    match err {
        EngineError::Upload {
            source: UploadError::Exhausted { attempts, last },
            ..
        } => {
            assert_eq!(attempts, 3);
            assert!(matches!(last, ApiError::Transport(_)));
        }
        other => panic!("Expected exhausted budget, got {:?}", other),
    }
    assert_eq!(uploader.attempts().len(), 3);
}

#[tokio::test]
async fn test_replace_and_filename_are_sent() {
    let uploader = MockUploader::new();
    let config = AgentConfig {
        replace: true,
        ..AgentConfig::default()
    };
    let mut engine = engine(config, RunContext::default(), uploader.clone(), &[]);

    engine
        .run(&upload_mode(), b"steps: [wait]", &env(&[]), ".ci-agent/pipeline.yml")
        .await
        .unwrap();

    let changes = uploader.changes();
    assert!(changes[0].replace);
    assert_eq!(changes[0].filename, ".ci-agent/pipeline.yml");
}
