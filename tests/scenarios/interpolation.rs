//! Test: Variable Interpolation
//!
//! Pipeline `env` and the runtime environment are merged before
//! interpolation; which side wins depends on an experiment.

use crate::helpers::*;
use ci_agent::core::config::AgentConfig;
use ci_agent::core::INTERPOLATION_PREFERS_RUNTIME_ENV;
use ci_agent::{CancelSignal, Experiments, RunContext, RunMode};

const PIPELINE: &[u8] = br#"
env:
  NAME: bob
  GREETING: "hello ${NAME}"
steps:
  - command: echo $NAME
  - command: echo ${GREETING}
    env:
      BRANCH: ${BUILD_BRANCH:-main}
"#;

async fn uploaded(ctx: RunContext, config: AgentConfig) -> serde_json::Value {
    let uploader = MockUploader::new();
    let mut engine = engine(config, ctx, uploader.clone(), &[]);
    engine
        .run(
            &RunMode::Upload {
                job_id: "job".to_string(),
            },
            PIPELINE,
            &env(&[("NAME", "alice")]),
            "pipeline.yml",
        )
        .await
        .unwrap();
    uploader.changes().remove(0).pipeline
}

#[tokio::test]
async fn test_pipeline_env_wins_by_default() {
    let pipeline = uploaded(RunContext::default(), AgentConfig::default()).await;

    assert_eq!(pipeline["steps"][0]["command"], "echo bob");
    assert_eq!(pipeline["steps"][1]["command"], "echo hello bob");
    assert_eq!(pipeline["steps"][1]["env"]["BRANCH"], "main");
    assert_eq!(pipeline["env"]["GREETING"], "hello bob");
}

#[tokio::test]
async fn test_runtime_env_wins_with_experiment() {
    let ctx = RunContext::new(
        Experiments::new().with(INTERPOLATION_PREFERS_RUNTIME_ENV),
        CancelSignal::never(),
    );
    let pipeline = uploaded(ctx, AgentConfig::default()).await;

    assert_eq!(pipeline["steps"][0]["command"], "echo alice");
}

#[tokio::test]
async fn test_env_order_is_preserved() {
    let pipeline = uploaded(RunContext::default(), AgentConfig::default()).await;
    let keys: Vec<&String> = pipeline["env"].as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["NAME", "GREETING"]);
}

#[tokio::test]
async fn test_disabled_interpolation_is_verbatim() {
    let config = AgentConfig {
        interpolate: false,
        ..AgentConfig::default()
    };
    let pipeline = uploaded(RunContext::default(), config).await;

    assert_eq!(pipeline["steps"][0]["command"], "echo $NAME");
    assert_eq!(pipeline["steps"][1]["env"]["BRANCH"], "${BUILD_BRANCH:-main}");
}
