//! Result aggregation
//!
//! Merges the values produced during a run into the final report for the
//! pipeline kind. Optional stage outputs that are absent stay absent.

use chrono::Utc;
use contracts::{
    AggregatedReport, AlumniMatch, AlumniProfile, AnalysisRequest, ContractError,
    ExtractedMetrics, FinancialAnalysis, FinancialReport, Level, LoadedImages, OutreachPlan,
    PipelineKind, PipelineState, ReferralPath, ReferralReport, ReferralSummary, ReportBody,
    StudentProfile, ValidationFindings,
};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::PipelineOutcome;

const STAGE: &str = "aggregate";

fn optional<T: DeserializeOwned>(state: &PipelineState, key: &str) -> Result<Option<T>, ContractError> {
    if state.contains(key) {
        state.get(STAGE, key).map(Some)
    } else {
        Ok(None)
    }
}

fn mandatory<T: DeserializeOwned>(
    state: &PipelineState,
    key: &str,
    producer: &str,
) -> Result<T, ContractError> {
    if !state.contains(key) {
        return Err(ContractError::stage_output(
            producer,
            format!("run finished without '{key}'"),
        ));
    }
    state.get(STAGE, key)
}

/// Build the final report for a finished run
///
/// # Errors
/// `ContractError::StageOutput` when the run lacks the pipeline's mandatory
/// output (`analysis` for financial, `matches` for referral).
#[instrument(skip(outcome), fields(run_id = %outcome.run_id))]
pub fn aggregate(kind: PipelineKind, outcome: &PipelineOutcome) -> Result<AggregatedReport, ContractError> {
    let body = match kind {
        PipelineKind::Financial => ReportBody::Financial(financial_report(&outcome.state)?),
        PipelineKind::Referral => ReportBody::Referral(referral_report(&outcome.state)?),
        PipelineKind::Generic => ReportBody::Generic(
            outcome
                .produced
                .iter()
                .filter_map(|k| outcome.state.get_raw(k).map(|v| (k.clone(), v.clone())))
                .collect(),
        ),
    };
    debug!(?kind, "report aggregated");

    Ok(AggregatedReport {
        run: outcome.summary(),
        body,
    })
}

fn financial_report(state: &PipelineState) -> Result<FinancialReport, ContractError> {
    let request: AnalysisRequest = state.get(STAGE, "request")?;
    let analysis: FinancialAnalysis = mandatory(state, "analysis", "analyze_financials")?;
    let images: Option<LoadedImages> = optional(state, "images")?;

    let (image_sources, skipped_images) = match images {
        Some(loaded) => (
            loaded.images.into_iter().map(|i| i.source).collect(),
            loaded.skipped,
        ),
        None => (request.image_sources, Vec::new()),
    };

    Ok(FinancialReport {
        company_name: request.company_name,
        generated_at: Utc::now(),
        image_sources,
        skipped_images,
        analysis,
        metrics: optional::<ExtractedMetrics>(state, "metrics")?,
        validation: optional::<ValidationFindings>(state, "validation")?,
    })
}

fn referral_report(state: &PipelineState) -> Result<ReferralReport, ContractError> {
    let student: StudentProfile = state.get(STAGE, "student_profile")?;
    let matches: Vec<AlumniMatch> = mandatory(state, "matches", "match_domains")?;
    let paths: Vec<ReferralPath> = optional(state, "paths")?.unwrap_or_default();
    let outreach: Vec<OutreachPlan> = optional(state, "outreach")?.unwrap_or_default();

    let alumni_considered = match optional::<Vec<AlumniProfile>>(state, "alumni")? {
        Some(alumni) => alumni.len(),
        None => matches.len(),
    };

    let top_recommendation = paths
        .first()
        .map(|p| {
            format!(
                "{} at {} ({} path, score {:.2})",
                p.alumni_name, p.alumni_company, p.path_type, p.path_score
            )
        })
        .or_else(|| {
            matches.first().map(|m| {
                format!(
                    "{} at {} (match score {:.2})",
                    m.alumni.name, m.alumni.current_company, m.match_score
                )
            })
        });

    let summary = ReferralSummary {
        alumni_considered,
        matches_found: matches.len(),
        high_potential_matches: matches
            .iter()
            .filter(|m| m.referral_potential == Level::High)
            .count(),
        paths_recommended: paths.len(),
        messages_generated: outreach.iter().map(|p| p.messages.len()).sum(),
        top_recommendation,
    };

    Ok(ReferralReport {
        student,
        generated_at: Utc::now(),
        matches,
        paths,
        outreach,
        summary,
    })
}
