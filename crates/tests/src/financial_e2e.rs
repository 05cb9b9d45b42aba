//! Financial report analyzer, images on disk through to report files

use std::sync::Arc;

use contracts::{
    AnalysisRequest, ContractError, FailureMode, PipelineBlueprint, PipelineKind, PipelineState,
    ReportBody, RunStatus, SinkType, StageStatus,
};
use model_client::{MockConfig, MockFailure, MockModelClient};
use orchestrator::OrchestratorError;
use serde_json::{json, Value};

use crate::support::{fast_retry, run_with, write_png};

const ANALYSIS_REPLY: &str = r#"Here is the analysis:
```json
{
  "executive_summary": "Acme Bank Group grew net profit to EUR 2.1 billion, up 12% on the prior year.",
  "key_metrics": {
    "Net Profit": {"value": "EUR 2.1B", "previous": "EUR 1.875B", "change": "+12%", "period": "FY2024"},
    "Total Revenue": {"value": "EUR 9.4B", "period": "FY2024"}
  },
  "balance_sheet": {
    "total_assets": {"value": "EUR 410B"},
    "total_liabilities": {"value": "EUR 380B"}
  },
  "financial_ratios": {
    "return_on_equity": {"value": "112%", "target": "10%", "status": "Meeting"},
    "CET1 ratio": {"value": "14.2%", "target": "10.5%", "status": "Meeting"}
  },
  "trends_analysis": ["Fee income rising"],
  "risk_assessment": {"credit_quality": "stable", "key_risks": ["rate cuts"]},
  "recommendations": ["Hold"]
}
```"#;

const METRICS_REPLY: &str = r#"{"net_income": {"value": "EUR 2.1B", "change": "+12%"}, "revenue": "EUR 9.4B"}"#;

fn seed(sources: Vec<String>, metrics: &[&str]) -> PipelineState {
    let mut request = AnalysisRequest::new("Acme Bank Group", sources);
    request.metrics = metrics.iter().map(|m| m.to_string()).collect();
    let mut state = PipelineState::new();
    state.insert_typed("request", &request).unwrap();
    state
}

#[tokio::test]
async fn test_financial_pipeline_writes_every_format() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("reports");
    let sources = vec![
        write_png(dir.path(), "page1.png", 64, 48),
        write_png(dir.path(), "page2.png", 32, 32),
        dir.path().join("notes.pdf").to_string_lossy().into_owned(),
    ];

    let blueprint = PipelineBlueprint::financial_default(true)
        .with_sinks(&SinkType::ALL, &out.to_string_lossy());
    let client = Arc::new(MockModelClient::new().with_script([ANALYSIS_REPLY, METRICS_REPLY]));

    let outcome = run_with(
        &blueprint,
        Arc::clone(&client),
        seed(sources, &["net_income", "revenue"]),
    )
    .await
    .unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.records.len(), 4);
    assert!(outcome.records.iter().all(|r| r.status == StageStatus::Succeeded));
    assert_eq!(outcome.summary().total_model_calls(), 2);
    assert_eq!(client.call_count(), 2);

    // both pages reached the model as images
    let requests = client.requests();
    assert_eq!(requests[0].images.len(), 2);
    assert!(requests[0].expect_json);

    let report = orchestrator::aggregate(PipelineKind::Financial, &outcome).unwrap();
    let ReportBody::Financial(ref fin) = report.body else {
        panic!("expected financial body");
    };
    assert_eq!(fin.image_sources.len(), 2);
    assert_eq!(fin.skipped_images.len(), 1);
    assert!(fin.skipped_images[0].source.ends_with("notes.pdf"));
    assert_eq!(fin.metrics.as_ref().unwrap().len(), 2);
    let validation = fin.validation.as_ref().unwrap();
    assert!(validation
        .warnings
        .iter()
        .any(|w| w.contains("ROE seems unusually high")));
    assert!(validation.figures.currencies.iter().any(|c| c.contains("EUR 2.1")));

    let summary = dispatcher::dispatch_report(blueprint.sinks.clone(), report)
        .await
        .unwrap();
    assert_eq!(summary.failures(), 0);
    assert_eq!(summary.artifacts.len(), 3);

    let find = |ext: &str| {
        summary
            .artifacts
            .iter()
            .find(|p| p.extension().is_some_and(|e| e == ext))
            .unwrap()
            .clone()
    };

    let md_path = find("md");
    let file_name = md_path.file_name().unwrap().to_string_lossy().to_string();
    assert!(file_name.starts_with("Acme_Bank_Group_analysis_"), "{file_name}");
    let md = std::fs::read_to_string(&md_path).unwrap();
    assert!(md.starts_with("# Financial Analysis Report\n## Acme Bank Group"));
    assert!(md.contains("## Executive Summary"));
    assert!(md.contains("## Extracted Metrics"));
    assert!(md.contains("## Data Validation"));

    let envelope: Value = serde_json::from_str(&std::fs::read_to_string(find("json")).unwrap()).unwrap();
    assert_eq!(envelope["metadata"]["report_type"], json!("financial_analysis"));
    assert_eq!(envelope["metadata"]["subject"], json!("Acme Bank Group"));
    assert_eq!(envelope["run"]["stages"].as_array().unwrap().len(), 4);

    let txt = std::fs::read_to_string(find("txt")).unwrap();
    assert!(txt.starts_with("FINANCIAL ANALYSIS SUMMARY"));
}

#[tokio::test]
async fn test_transient_failures_are_retried_through_the_stack() {
    let dir = tempfile::tempdir().unwrap();
    let sources = vec![write_png(dir.path(), "page1.png", 40, 30)];

    let mut blueprint = PipelineBlueprint::financial_default(false);
    blueprint.retry = fast_retry(3);
    let client = Arc::new(
        MockModelClient::with_config(MockConfig {
            fail_times: 2,
            failure: MockFailure::Transient,
            ..Default::default()
        })
        .with_default_reply(ANALYSIS_REPLY),
    );

    let outcome = run_with(&blueprint, Arc::clone(&client), seed(sources, &[]))
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    let analyze = outcome
        .records
        .iter()
        .find(|r| r.name == "analyze_financials")
        .unwrap();
    assert_eq!(analyze.attempts, 3);
    assert_eq!(client.call_count(), 3);
    // failed attempts still count toward the run's model usage
    assert_eq!(analyze.model_calls, 3);
    assert_eq!(outcome.summary().total_model_calls(), 3);
    // the load stage ran once; retries stay local to the failing stage
    assert_eq!(outcome.records[0].attempts, 1);
}

#[tokio::test]
async fn test_rate_limit_exhausts_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let sources = vec![write_png(dir.path(), "page1.png", 40, 30)];

    let mut blueprint = PipelineBlueprint::financial_default(false);
    blueprint.retry = fast_retry(2);
    let client = Arc::new(MockModelClient::with_config(MockConfig {
        fail_times: 5,
        failure: MockFailure::RateLimited { retry_after_ms: 1 },
        ..Default::default()
    }));

    let err = run_with(&blueprint, Arc::clone(&client), seed(sources, &[]))
        .await
        .unwrap_err();
    assert_eq!(err.records()[1].model_calls, 2);

    match err {
        OrchestratorError::StageFailed {
            ref stage,
            attempts,
            ref source,
            ..
        } => {
            assert_eq!(stage, "analyze_financials");
            assert_eq!(attempts, 2);
            assert!(matches!(source, ContractError::ModelRateLimited { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(client.call_count(), 2);
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let sources = vec![write_png(dir.path(), "page1.png", 40, 30)];

    let mut blueprint = PipelineBlueprint::financial_default(false);
    blueprint.retry = fast_retry(3);
    let client = Arc::new(MockModelClient::with_config(MockConfig {
        fail_times: 1,
        failure: MockFailure::Permanent,
        ..Default::default()
    }));

    let err = run_with(&blueprint, Arc::clone(&client), seed(sources, &[]))
        .await
        .unwrap_err();

    let records = err.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].status, StageStatus::Succeeded);
    assert_eq!(records[1].status, StageStatus::Failed);
    assert_eq!(records[1].attempts, 1);
    assert_eq!(client.call_count(), 1);
}

#[tokio::test]
async fn test_continue_on_error_skips_dependents() {
    let dir = tempfile::tempdir().unwrap();
    let sources = vec![write_png(dir.path(), "page1.png", 40, 30)];

    let mut blueprint = PipelineBlueprint::financial_default(false);
    blueprint.retry = fast_retry(1);
    blueprint.failure_mode = FailureMode::ContinueOnError;
    let client = Arc::new(MockModelClient::with_config(MockConfig {
        fail_times: 1,
        failure: MockFailure::Permanent,
        ..Default::default()
    }));

    let outcome = run_with(&blueprint, client, seed(sources, &[]))
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Partial);
    let statuses: Vec<_> = outcome.records.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![StageStatus::Succeeded, StageStatus::Failed, StageStatus::Skipped]
    );
    assert!(!outcome.state.contains("validation"));

    // the analysis is the report's reason to exist
    let err = orchestrator::aggregate(PipelineKind::Financial, &outcome).unwrap_err();
    assert!(matches!(err, ContractError::StageOutput { .. }));
}

#[tokio::test]
async fn test_no_loadable_images_fails_before_any_model_call() {
    let blueprint = PipelineBlueprint::financial_default(false);
    let client = Arc::new(MockModelClient::new());

    let err = run_with(
        &blueprint,
        Arc::clone(&client),
        seed(vec!["/definitely/not/here.png".into()], &[]),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, OrchestratorError::StageFailed { ref stage, .. } if stage == "load_images"));
    assert_eq!(client.call_count(), 0);
}
