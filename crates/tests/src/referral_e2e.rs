//! Alumni referral: mining, matching, paths and outreach with a mock model

use std::sync::Arc;

use contracts::{
    MessageSource, PipelineBlueprint, PipelineKind, PipelineState, ReportBody, RunStatus, SinkType,
    StageStatus,
};
use model_client::MockModelClient;
use serde_json::{json, Value};

use crate::support::{fast_retry, run_with};

fn seed(criteria: Value) -> PipelineState {
    let mut state = PipelineState::new();
    state.insert(
        "student_profile",
        json!({
            "name": "Sam Lee",
            "university": "State University",
            "graduation_year": 2025,
            "degree": "BS",
            "major": "Computer Science",
            "skills": ["Python", "SQL", "Machine Learning"],
            "target_companies": ["Google"],
            "target_roles": ["Data Scientist"],
            "email": "sam@state.edu"
        }),
    );
    state.insert("mining_criteria", criteria);
    state.insert(
        "alumni_roster",
        json!([
            {
                "name": "Ana Diaz", "graduation_year": 2016, "current_company": "Google",
                "current_role": "Senior Data Scientist", "industry": "Technology",
                "years_experience": 8, "skills": ["Python", "SQL", "Machine Learning"],
                "email": "ana@example.com", "linkedin_url": "https://linkedin.com/in/ana"
            },
            {
                "name": "Ben Ode", "graduation_year": 2012, "current_company": "Meta",
                "current_role": "Data Engineer", "industry": "Technology",
                "years_experience": 12, "skills": ["SQL", "Spark"]
            },
            {
                "name": "Cai Wu", "graduation_year": 2019, "current_company": "Bakery Co",
                "current_role": "Pastry Chef", "industry": "Food",
                "years_experience": 5, "skills": ["Baking"]
            }
        ]),
    );
    state
}

fn blueprint() -> PipelineBlueprint {
    let mut bp = PipelineBlueprint::referral_default();
    bp.retry = fast_retry(2);
    bp
}

fn model_client() -> MockModelClient {
    MockModelClient::new().with_responder(|req| {
        if req.expect_json {
            r#"{"insights": {"Ana Diaz": "Leads the ads ranking team; ask about ML infra."}}"#
                .to_string()
        } else {
            "Subject: Fellow State alum asking for advice\n\nHi Ana, I am a State University \
             senior studying Computer Science with Python and SQL experience. Would you be \
             open to a short chat about the Data Scientist role at Google?\n\nBest,\nSam"
                .to_string()
        }
    })
}

#[tokio::test]
async fn test_referral_pipeline_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let bp = blueprint().with_sinks(&[SinkType::Markdown, SinkType::Json], &dir.path().to_string_lossy());
    let client = Arc::new(model_client());

    let outcome = run_with(&bp, Arc::clone(&client), seed(json!({})))
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(
        outcome.produced,
        vec!["alumni", "matches", "paths", "outreach"]
    );
    // one insight call, then LinkedIn, email and follow-up for the top path
    assert_eq!(client.call_count(), 4);

    let report = orchestrator::aggregate(PipelineKind::Referral, &outcome).unwrap();
    assert_eq!(report.subject(), "Sam Lee");
    let ReportBody::Referral(ref r) = report.body else {
        panic!("expected referral body");
    };

    assert_eq!(r.summary.alumni_considered, 3);
    assert_eq!(r.matches[0].alumni.name, "Ana Diaz");
    assert!(r.matches.iter().all(|m| m.alumni.name != "Cai Wu"));
    assert_eq!(
        r.matches[0].insights.as_deref(),
        Some("Leads the ads ranking team; ask about ML infra.")
    );
    assert!(r.summary.paths_recommended >= 1);
    assert_eq!(r.paths[0].alumni_name, "Ana Diaz");
    assert!(r
        .summary
        .top_recommendation
        .as_deref()
        .unwrap()
        .starts_with("Ana Diaz at Google"));

    assert_eq!(r.outreach.len(), 1);
    let plan = &r.outreach[0];
    assert_eq!(plan.recipient, "Ana Diaz");
    assert_eq!(plan.messages.len(), 3);
    assert!(plan.messages.iter().all(|m| m.source == MessageSource::Model));
    assert_eq!(r.summary.messages_generated, 3);

    let summary = dispatcher::dispatch_report(bp.sinks.clone(), report)
        .await
        .unwrap();
    assert_eq!(summary.artifacts.len(), 2);
    for path in &summary.artifacts {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("Sam_Lee_referrals_"), "{name}");
    }
    let md_path = summary
        .artifacts
        .iter()
        .find(|p| p.extension().is_some_and(|e| e == "md"))
        .unwrap();
    let md = std::fs::read_to_string(md_path).unwrap();
    assert!(md.starts_with("# Alumni Referral Report"));
    assert!(md.contains("## Outreach Plan"));
}

#[tokio::test]
async fn test_message_failures_degrade_to_templates_on_final_attempt() {
    let bp = blueprint();
    // insights succeed; every message call returns an empty reply
    let client = Arc::new(MockModelClient::new().with_responder(|req| {
        if req.expect_json {
            r#"{"insights": {}}"#.to_string()
        } else {
            String::new()
        }
    }));

    let outcome = run_with(&bp, Arc::clone(&client), seed(json!({})))
        .await
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    let record = outcome
        .records
        .iter()
        .find(|r| r.name == "generate_messages")
        .unwrap();
    assert_eq!(record.status, StageStatus::Succeeded);
    assert_eq!(record.attempts, 2);
    assert_eq!(record.notes.len(), 3);
    assert!(record.notes[0].contains("built-in template"));

    let report = orchestrator::aggregate(PipelineKind::Referral, &outcome).unwrap();
    let ReportBody::Referral(r) = report.body else {
        panic!("expected referral body");
    };
    let messages = &r.outreach[0].messages;
    assert!(messages.iter().all(|m| m.source == MessageSource::Template));
    assert!(messages.iter().all(|m| m.body.contains("Ana Diaz")));
}

#[tokio::test]
async fn test_company_filter_leaves_nothing_to_match() {
    let bp = blueprint();
    let client = Arc::new(model_client());

    let outcome = run_with(
        &bp,
        Arc::clone(&client),
        seed(json!({"target_companies": ["Netflix"]})),
    )
    .await
    .unwrap();

    // every stage still runs; empty inputs give empty outputs
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(client.call_count(), 0);

    let report = orchestrator::aggregate(PipelineKind::Referral, &outcome).unwrap();
    let ReportBody::Referral(r) = report.body else {
        panic!("expected referral body");
    };
    assert_eq!(r.summary.alumni_considered, 0);
    assert!(r.matches.is_empty());
    assert!(r.outreach.is_empty());
    assert!(r.summary.top_recommendation.is_none());
}
