//! `refer` command implementation.

use anyhow::{Context, Result};
use contracts::{
    AlumniProfile, MiningCriteria, PipelineBlueprint, PipelineState, ReportBody, StageKind,
    StudentProfile,
};
use serde_json::Value;
use tracing::{info, warn};

use super::apply_overrides;
use crate::cli::ReferArgs;
use crate::pipeline::{execute, read_json, RunOptions};

/// Execute the `refer` command
pub async fn run_refer(args: &ReferArgs, options: RunOptions) -> Result<()> {
    let student: StudentProfile = read_json(&args.student)?;
    let roster: Vec<AlumniProfile> = match args.alumni {
        Some(ref path) => read_json(path)?,
        None => Vec::new(),
    };
    info!(
        student = %student.name,
        university = %student.university,
        roster = roster.len(),
        "Finding referral paths"
    );

    let criteria = MiningCriteria {
        target_companies: args.companies.clone(),
        graduation_years: args.years.clone(),
        roles: args.roles.clone(),
        skills: args.skills.clone(),
        university: Some(student.university.clone()),
    };

    let mut blueprint = referral_blueprint(roster.is_empty(), args.recipients);
    apply_overrides(&mut blueprint, &args.model, &args.output);

    let mut seed = PipelineState::new();
    seed.insert_typed("student_profile", &student)?;
    seed.insert_typed("mining_criteria", &criteria)?;
    seed.insert_typed("alumni_roster", &roster)?;

    let options = RunOptions {
        api_key: args.model.api_key.clone().or(options.api_key),
        ..options
    };
    let run = execute(&blueprint, seed, &options)
        .await
        .context("Referral pipeline failed")?;

    run.stats().print_summary();

    if let ReportBody::Referral(ref report) = run.report.body {
        let summary = &report.summary;
        println!("🎓 Referral Summary");
        println!("   ├─ Alumni considered: {}", summary.alumni_considered);
        println!(
            "   ├─ Matches: {} ({} high potential)",
            summary.matches_found, summary.high_potential_matches
        );
        println!("   ├─ Paths recommended: {}", summary.paths_recommended);
        println!("   ├─ Messages drafted: {}", summary.messages_generated);
        match summary.top_recommendation {
            Some(ref top) => println!("   └─ Top recommendation: {top}"),
            None => {
                println!("   └─ Top recommendation: none");
                warn!("No alumni matched the student profile");
            }
        }
        println!();
    }

    Ok(())
}

/// Standard referral pipeline; an empty roster switches mining to the model
fn referral_blueprint(empty_roster: bool, recipients: u64) -> PipelineBlueprint {
    let mut blueprint = PipelineBlueprint::referral_default();
    for stage in &mut blueprint.stages {
        match stage.kind {
            StageKind::MineAlumni if empty_roster => {
                stage
                    .params
                    .insert("model_mining".to_string(), Value::Bool(true));
            }
            StageKind::GenerateMessages => {
                stage
                    .params
                    .insert("max_recipients".to_string(), Value::from(recipients));
            }
            _ => {}
        }
    }
    blueprint
}
