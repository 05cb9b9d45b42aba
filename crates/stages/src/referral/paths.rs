//! Referral path recommendation
//!
//! Turns ranked matches into concrete outreach paths with an evaluation,
//! success estimate, risks and next steps. Purely local.

use async_trait::async_trait;
use contracts::{
    AlumniMatch, ContractError, Level, PathEvaluation, PathType, ReferralPath, Stage, StageConfig,
    StageContext, StageDescriptor, StageOutput, StudentProfile,
};
use tracing::{info, instrument};

use crate::common::round3;

const DEFAULT_MAX_PATHS: u64 = 8;
const SENIOR_TITLES: &[&str] = &["director", "vp", "vice president", "head", "principal", "chief"];
const MID_TITLES: &[&str] = &["manager", "lead"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Seniority {
    Senior,
    Mid,
    Junior,
}

fn seniority(role: &str, years: u32) -> Seniority {
    let role = role.to_lowercase();
    let has = |titles: &[&str]| {
        role.split(|c: char| !c.is_alphanumeric())
            .any(|w| titles.contains(&w))
            || titles.iter().any(|t| t.contains(' ') && role.contains(t))
    };
    if has(SENIOR_TITLES) || years > 10 {
        Seniority::Senior
    } else if has(MID_TITLES) || years > 5 {
        Seniority::Mid
    } else {
        Seniority::Junior
    }
}

fn response_time(seniority: Seniority) -> &'static str {
    match seniority {
        Seniority::Senior => "3-7 days",
        Seniority::Mid => "2-5 days",
        Seniority::Junior => "1-3 days",
    }
}

pub fn success_probability(m: &AlumniMatch, path_type: PathType) -> f64 {
    let mut p = path_type.base_success_probability();
    if m.alumni.willing_to_refer {
        p += 0.1;
    }
    if m.alumni.has_capacity() {
        p += 0.1;
    } else {
        p -= 0.2;
    }
    round3(p.clamp(0.0, 1.0))
}

pub fn evaluate(m: &AlumniMatch) -> PathEvaluation {
    let a = &m.alumni;
    let seniority = seniority(&a.current_role, a.years_experience);

    let mut accessibility: f64 = 0.5;
    if a.linkedin_url.is_some() {
        accessibility += 0.2;
    }
    if a.email.is_some() {
        accessibility += 0.2;
    }
    if a.willing_to_refer {
        accessibility += 0.1;
    }

    let influence = if a.years_experience >= 10 || seniority == Seniority::Senior {
        0.9
    } else if a.years_experience >= 5 || seniority == Seniority::Mid {
        0.7
    } else if a.years_experience >= 2 {
        0.6
    } else {
        0.4
    };

    let responsiveness = match seniority {
        Seniority::Junior => 0.9,
        Seniority::Mid => 0.7,
        Seniority::Senior => 0.6,
    };

    let half = f64::from(a.max_referrals_per_year) / 2.0;
    let timing = if a.referral_count == 0 {
        1.0
    } else if f64::from(a.referral_count) < half {
        0.8
    } else if a.has_capacity() {
        0.6
    } else {
        0.2
    };

    PathEvaluation {
        accessibility: round3(accessibility.min(1.0)),
        influence,
        responsiveness,
        relevance: round3((m.breakdown.company + m.breakdown.role) / 2.0),
        timing,
    }
}

pub fn path_score(connection: f64, success: f64, eval: &PathEvaluation) -> f64 {
    round3(
        0.25 * connection
            + 0.25 * success
            + 0.20 * eval.responsiveness
            + 0.15 * eval.influence
            + 0.15 * eval.accessibility,
    )
}

pub fn confidence(score: f64) -> Level {
    if score >= 0.8 {
        Level::High
    } else if score >= 0.6 {
        Level::Medium
    } else {
        Level::Low
    }
}

fn risk_factors(m: &AlumniMatch, path_type: PathType) -> Vec<String> {
    let a = &m.alumni;
    let mut risks = Vec::new();
    if !a.willing_to_refer {
        risks.push("Alumnus has not indicated willingness to refer".to_string());
    }
    if !a.has_capacity() {
        risks.push("Referral capacity for this year is used up".to_string());
    }
    if a.email.is_none() && a.linkedin_url.is_none() {
        risks.push("No direct contact details on record".to_string());
    }
    if m.match_score < 0.5 {
        risks.push("Weak profile alignment".to_string());
    }
    if path_type == PathType::SkillBased {
        risks.push("Alumnus is not at a target company; referral would be indirect".to_string());
    }
    risks
}

fn next_steps(student: &StudentProfile, m: &AlumniMatch, path_type: PathType) -> Vec<String> {
    let a = &m.alumni;
    let channel = if a.linkedin_url.is_some() {
        "LinkedIn message"
    } else if a.email.is_some() {
        "email"
    } else {
        "introduction through the alumni office"
    };

    let mut steps = vec![format!(
        "Research {}'s recent work at {}",
        a.name, a.current_company
    )];
    match path_type {
        PathType::Direct => {
            steps.push(format!("Send a personalized {channel}"));
            let role = student
                .target_roles
                .first()
                .map(String::as_str)
                .unwrap_or("entry-level");
            steps.push(format!(
                "Ask about open {role} positions at {}",
                a.current_company
            ));
        }
        PathType::SkillBased => {
            if m.matching_skills.is_empty() {
                steps.push(format!("Send a personalized {channel}"));
            } else {
                steps.push(format!(
                    "Open with shared skills ({}) in a personalized {channel}",
                    m.matching_skills.join(", ")
                ));
            }
            steps.push("Ask for an introduction to hiring teams at your target companies".into());
        }
    }
    steps.push("Follow up if no response within a week".into());
    steps
}

/// Build and rank paths from matches
pub fn recommend(student: &StudentProfile, matches: &[AlumniMatch], max_paths: usize) -> Vec<ReferralPath> {
    let mut paths: Vec<ReferralPath> = matches
        .iter()
        .take(max_paths)
        .map(|m| {
            let a = &m.alumni;
            let path_type = if m.breakdown.company >= 0.5 {
                PathType::Direct
            } else {
                PathType::SkillBased
            };
            let success = success_probability(m, path_type);
            let evaluation = evaluate(m);
            let score = path_score(m.match_score, success, &evaluation);

            ReferralPath {
                path_id: String::new(),
                alumni_name: a.name.clone(),
                alumni_company: a.current_company.clone(),
                alumni_role: a.current_role.clone(),
                path_type,
                connection_strength: m.match_score,
                success_probability: success,
                estimated_response_time: response_time(seniority(&a.current_role, a.years_experience))
                    .to_string(),
                evaluation,
                path_score: score,
                confidence: confidence(score),
                risk_factors: risk_factors(m, path_type),
                next_steps: next_steps(student, m, path_type),
                alumni_email: a.email.clone(),
                alumni_linkedin: a.linkedin_url.clone(),
                shared_skills: m.matching_skills.clone(),
                years_experience: a.years_experience,
            }
        })
        .collect();

    paths.sort_by(|a, b| {
        b.path_score
            .total_cmp(&a.path_score)
            .then_with(|| a.alumni_name.cmp(&b.alumni_name))
    });
    for (i, path) in paths.iter_mut().enumerate() {
        path.path_id = format!("path_{}", i + 1);
    }
    paths
}

pub struct RecommendPathsStage {
    descriptor: StageDescriptor,
    max_paths: usize,
}

impl RecommendPathsStage {
    pub fn from_config(descriptor: StageDescriptor, config: &StageConfig) -> Self {
        Self {
            descriptor,
            max_paths: config.param_u64("max_paths").unwrap_or(DEFAULT_MAX_PATHS) as usize,
        }
    }
}

#[async_trait]
impl Stage for RecommendPathsStage {
    fn descriptor(&self) -> &StageDescriptor {
        &self.descriptor
    }

    #[instrument(name = "recommend_paths", skip_all, fields(stage = %self.descriptor.name))]
    async fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutput, ContractError> {
        let stage = self.descriptor.name.as_str();
        let student: StudentProfile = ctx.state.get(stage, &self.descriptor.requires[0])?;
        let matches: Vec<AlumniMatch> = ctx.state.get(stage, &self.descriptor.requires[1])?;

        let paths = recommend(&student, &matches, self.max_paths);
        info!(paths = paths.len(), "referral paths ranked");

        let output = StageOutput::typed(stage, &paths)?;
        if paths.is_empty() {
            return Ok(output.with_note("no matches to build referral paths from"));
        }
        Ok(output)
    }
}
