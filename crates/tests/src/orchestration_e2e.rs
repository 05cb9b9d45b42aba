//! Config-driven pipelines, timeouts and cancellation

use std::sync::Arc;
use std::time::Duration;

use config_loader::{ConfigFormat, ConfigLoader};
use contracts::{
    ContractError, ModelSettings, PipelineKind, PipelineState, ReportBody, RetryPolicy,
    RunStatus, StageConfig, StageKind,
};
use model_client::{MockConfig, MockModelClient};
use orchestrator::{OrchestratorError, PipelineBuilder};
use serde_json::{json, Value};

use crate::support::run_with;

const OUTLINE_PIPELINE: &str = r#"
stage_timeout_secs = 5

[pipeline]
name = "blog_writer"
kind = "generic"
seeds = ["topic"]

[model]
provider = "mock"

[retry]
max_attempts = 2
initial_backoff_ms = 1
max_backoff_ms = 2

[[stages]]
name = "outline"
kind = "prompt"
requires = ["topic"]
produces = "outline"

[stages.params]
template = "Write an outline about {topic}"

[[stages]]
name = "draft"
kind = "prompt"
requires = ["topic", "outline"]
produces = "draft"

[stages.params]
template = "Expand {outline} into a post about {topic}"
parse_json = false

[[sinks]]
name = "report_json"
sink_type = "json"
"#;

#[tokio::test]
async fn test_config_driven_generic_pipeline() {
    let blueprint = ConfigLoader::load_from_str(OUTLINE_PIPELINE, ConfigFormat::Toml).unwrap();
    let client = Arc::new(
        MockModelClient::new()
            .with_script([r#"{"sections": ["Intro", "Ownership", "Wrap-up"]}"#, "Rust is fun."]),
    );

    let mut seed = PipelineState::new();
    seed.insert("topic", json!("borrowing in Rust"));

    let outcome = run_with(&blueprint, Arc::clone(&client), seed).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.produced, vec!["outline", "draft"]);

    // the second prompt sees the first stage's output
    let requests = client.requests();
    assert_eq!(requests[0].prompt, "Write an outline about borrowing in Rust");
    assert!(requests[1].prompt.contains("Ownership"));
    assert!(requests[1].prompt.ends_with("into a post about borrowing in Rust"));

    let report = orchestrator::aggregate(PipelineKind::Generic, &outcome).unwrap();
    assert_eq!(report.report_type(), "pipeline_output");
    let ReportBody::Generic(values) = report.body else {
        panic!("expected generic body");
    };
    assert_eq!(values.keys().collect::<Vec<_>>(), vec!["draft", "outline"]);
    assert_eq!(values["outline"]["sections"][1], json!("Ownership"));
    assert_eq!(values["draft"], json!("Rust is fun."));
}

#[tokio::test]
async fn test_config_rejects_unknown_input() {
    let broken = OUTLINE_PIPELINE.replace("requires = [\"topic\", \"outline\"]", "requires = [\"summary\"]");
    let err = ConfigLoader::load_from_str(&broken, ConfigFormat::Toml).unwrap_err();
    assert!(matches!(err, ContractError::ConfigValidation { .. }));
    assert!(err.to_string().contains("summary"));
}

fn slow_prompt_stage(client: Arc<MockModelClient>) -> Box<dyn contracts::Stage> {
    let mut config = StageConfig::new("slow", StageKind::Prompt)
        .with_param("template", "Summarize {topic}")
        .with_param("parse_json", false);
    config.requires = Some(vec!["topic".into()]);
    config.produces = Some("summary".into());
    stages::build_stage(&config, client, &ModelSettings::default()).unwrap()
}

#[tokio::test]
async fn test_attempt_timeout_is_retried_then_fails() {
    let client = Arc::new(
        MockModelClient::with_config(MockConfig {
            latency: Duration::from_millis(500),
            ..Default::default()
        })
        .with_default_reply("done"),
    );

    let pipeline = PipelineBuilder::new("slow_pipeline")
        .seed_keys(["topic"])
        .stage(slow_prompt_stage(Arc::clone(&client)))
        .retry(RetryPolicy::fixed(2, Duration::from_millis(1)))
        .stage_timeout(Duration::from_millis(20))
        .build()
        .unwrap();

    let mut seed = PipelineState::new();
    seed.insert("topic", Value::String("queues".into()));

    let err = pipeline.run("run-timeout", seed).await.unwrap_err();
    match err {
        OrchestratorError::StageFailed {
            attempts,
            ref source,
            ..
        } => {
            assert_eq!(attempts, 2);
            assert!(matches!(source, ContractError::Timeout { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    // each attempt reached the client before being cut off
    assert_eq!(client.call_count(), 2);
}

#[tokio::test]
async fn test_dropping_run_cancels_in_flight_attempt() {
    let client = Arc::new(
        MockModelClient::with_config(MockConfig {
            latency: Duration::from_secs(30),
            ..Default::default()
        })
        .with_default_reply("never"),
    );
    let pipeline = PipelineBuilder::new("cancel_me")
        .seed_keys(["topic"])
        .stage(slow_prompt_stage(Arc::clone(&client)))
        .build()
        .unwrap();

    let mut seed = PipelineState::new();
    seed.insert("topic", json!("signals"));

    let result = tokio::time::timeout(Duration::from_millis(50), pipeline.run("run-cancel", seed)).await;
    assert!(result.is_err(), "run should still be waiting on the model");
    assert_eq!(client.call_count(), 1);
    assert!(client.requests().is_empty());
}
