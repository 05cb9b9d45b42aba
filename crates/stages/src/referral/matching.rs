//! Student / alumni domain matching
//!
//! Each alumnus gets a weighted score over five dimensions. Only the
//! optional insight paragraph comes from the model; scoring is local.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Datelike;
use contracts::{
    AlumniMatch, AlumniProfile, ContractError, Level, ModelClient, ModelRequest, ScoreBreakdown,
    Stage, StageConfig, StageContext, StageDescriptor, StageOutput, StudentProfile,
};
use model_client::extract_json;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::common::{jaccard, normalized_set, round3, Sampling};

pub const SKILL_WEIGHT: f64 = 0.30;
pub const COMPANY_WEIGHT: f64 = 0.25;
pub const ROLE_WEIGHT: f64 = 0.20;
pub const EXPERIENCE_WEIGHT: f64 = 0.15;
pub const INDUSTRY_WEIGHT: f64 = 0.10;

const DEFAULT_MIN_SCORE: f64 = 0.3;
const DEFAULT_TOP_K: u64 = 15;
const INSIGHT_CANDIDATES: usize = 5;

const ROLE_FAMILIES: &[&[&str]] = &[
    &["engineer", "developer", "programmer", "architect"],
    &["manager", "lead", "director", "head"],
    &["analyst", "researcher", "scientist"],
    &["consultant", "advisor", "strategist"],
];

pub fn company_score(target_companies: &[String], alumni_company: &str) -> f64 {
    let company = alumni_company.trim().to_lowercase();
    let targets = normalized_set(target_companies);
    if targets.is_empty() || company.is_empty() {
        return 0.5;
    }
    if targets
        .iter()
        .any(|t| company.contains(t.as_str()) || t.contains(&company))
    {
        1.0
    } else {
        0.0
    }
}

/// Exact or substring match scores 1.0; a shared keyword family (by containment on both sides) 0.8
pub fn role_score(target_roles: &[String], alumni_role: &str) -> f64 {
    let role = alumni_role.trim().to_lowercase();
    let targets = normalized_set(target_roles);
    if targets.is_empty() || role.is_empty() {
        return 0.5;
    }
    if targets
        .iter()
        .any(|t| role.contains(t.as_str()) || t.contains(&role))
    {
        return 1.0;
    }
    let same_family = targets.iter().any(|t| {
        ROLE_FAMILIES.iter().any(|family| {
            family.iter().any(|k| t.contains(k)) && family.iter().any(|k| role.contains(k))
        })
    });
    if same_family {
        0.8
    } else {
        0.2
    }
}

/// Mentoring fit by the experience gap between alumnus and student
pub fn experience_score(student_graduation_year: i32, reference_year: i32, alumni_years: u32) -> f64 {
    let student_stage = i64::from((reference_year - student_graduation_year).max(0));
    let gap = i64::from(alumni_years) - student_stage;
    match gap {
        3..=10 => 1.0,
        1..=2 => 0.8,
        11..=15 => 0.7,
        g if g > 15 => 0.5,
        _ => 0.3,
    }
}

pub fn industry_score(interests: &[String], industry: &str) -> f64 {
    let interests = normalized_set(interests);
    let keywords: Vec<String> = industry.split_whitespace().map(str::to_lowercase).collect();
    if interests.is_empty() || keywords.is_empty() {
        return 0.5;
    }
    if interests
        .iter()
        .any(|i| keywords.iter().any(|k| i.contains(k.as_str())))
    {
        1.0
    } else if interests
        .iter()
        .any(|i| keywords.iter().any(|k| k.contains(i.as_str())))
    {
        0.8
    } else {
        0.3
    }
}

pub fn referral_potential(alumni: &AlumniProfile) -> Level {
    if !alumni.willing_to_refer || !alumni.has_capacity() {
        return Level::Low;
    }
    if alumni.years_experience >= 5 && alumni.referral_count < alumni.max_referrals_per_year / 2 {
        Level::High
    } else if alumni.years_experience >= 3 {
        Level::Medium
    } else {
        Level::Low
    }
}

pub fn contact_feasibility(alumni: &AlumniProfile) -> Level {
    let has = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
    match (has(&alumni.email), has(&alumni.linkedin_url)) {
        (true, true) => Level::High,
        (true, false) | (false, true) => Level::Medium,
        (false, false) => Level::Low,
    }
}

/// Score one alumnus against the student
pub fn score_alumni(
    student: &StudentProfile,
    alumni: &AlumniProfile,
    reference_year: i32,
) -> AlumniMatch {
    let student_skills = normalized_set(&student.skills);
    let alumni_skills = normalized_set(&alumni.skills);

    let breakdown = ScoreBreakdown {
        skill: round3(jaccard(&student_skills, &alumni_skills)),
        company: company_score(&student.target_companies, &alumni.current_company),
        role: role_score(&student.target_roles, &alumni.current_role),
        experience: experience_score(student.graduation_year, reference_year, alumni.years_experience),
        industry: industry_score(&student.interests, &alumni.industry),
    };
    let score = breakdown.skill * SKILL_WEIGHT
        + breakdown.company * COMPANY_WEIGHT
        + breakdown.role * ROLE_WEIGHT
        + breakdown.experience * EXPERIENCE_WEIGHT
        + breakdown.industry * INDUSTRY_WEIGHT;

    AlumniMatch {
        alumni: alumni.clone(),
        match_score: round3(score),
        breakdown,
        matching_skills: student_skills.intersection(&alumni_skills).cloned().collect(),
        referral_potential: referral_potential(alumni),
        contact_feasibility: contact_feasibility(alumni),
        insights: None,
    }
}

/// Score, filter by `min_score`, rank and keep the best `top_k`
pub fn rank_matches(
    student: &StudentProfile,
    alumni: &[AlumniProfile],
    reference_year: i32,
    min_score: f64,
    top_k: usize,
) -> Vec<AlumniMatch> {
    let mut matches: Vec<AlumniMatch> = alumni
        .iter()
        .map(|a| score_alumni(student, a, reference_year))
        .filter(|m| m.match_score >= min_score)
        .collect();
    matches.sort_by(|a, b| {
        b.match_score
            .total_cmp(&a.match_score)
            .then_with(|| a.alumni.name.cmp(&b.alumni.name))
    });
    matches.truncate(top_k);
    matches
}

#[derive(Debug, Deserialize)]
struct InsightReply {
    #[serde(default)]
    insights: BTreeMap<String, String>,
}

pub struct MatchDomainsStage<C> {
    descriptor: StageDescriptor,
    client: Arc<C>,
    sampling: Sampling,
    min_score: f64,
    top_k: usize,
    reference_year: i32,
    model_insights: bool,
}

impl<C> MatchDomainsStage<C>
where
    C: ModelClient + Send + Sync + 'static,
{
    pub fn from_config(
        descriptor: StageDescriptor,
        config: &StageConfig,
        client: Arc<C>,
        sampling: Sampling,
    ) -> Self {
        Self {
            descriptor,
            client,
            sampling,
            min_score: config.param_f64("min_score").unwrap_or(DEFAULT_MIN_SCORE),
            top_k: config.param_u64("top_k").unwrap_or(DEFAULT_TOP_K) as usize,
            reference_year: config
                .param_u64("reference_year")
                .map(|y| y as i32)
                .unwrap_or_else(|| chrono::Utc::now().year()),
            model_insights: config.param_bool("model_insights").unwrap_or(true),
        }
    }

    async fn insights(
        &self,
        student: &StudentProfile,
        matches: &[AlumniMatch],
    ) -> Result<BTreeMap<String, String>, ContractError> {
        let candidates: Vec<String> = matches
            .iter()
            .take(INSIGHT_CANDIDATES)
            .map(|m| {
                format!(
                    "- {}: {} at {}, {} years, skills: {}, score {:.2}",
                    m.alumni.name,
                    m.alumni.current_role,
                    m.alumni.current_company,
                    m.alumni.years_experience,
                    m.alumni.skills.join(", "),
                    m.match_score
                )
            })
            .collect();

        let prompt = format!(
            "Student: {} ({} {}, graduating {}), skills: {}, interests: {}, targets: {} / {}.\n\n\
             Candidate alumni:\n{}\n\n\
             For each alumnus, write one or two sentences on why they are a good referral contact \
             and what to talk about. Respond with JSON only: {{\"insights\": {{\"<alumnus name>\": \"...\"}}}}",
            student.name,
            student.degree,
            student.major,
            student.graduation_year,
            student.skills.join(", "),
            student.interests.join(", "),
            student.target_companies.join(", "),
            student.target_roles.join(", "),
            candidates.join("\n"),
        );

        let request = self
            .sampling
            .apply(ModelRequest::new(prompt))
            .with_context("You are a career counselor matching students with alumni mentors.")
            .expecting_json();
        let response = self.client.generate(&request).await?;

        extract_json(&response.text)
            .and_then(|v| serde_json::from_value::<InsightReply>(v).ok())
            .map(|r| r.insights)
            .ok_or_else(|| {
                ContractError::model_response(
                    self.client.provider().as_str(),
                    "insight reply did not match {\"insights\": {...}}",
                )
            })
    }
}

#[async_trait]
impl<C> Stage for MatchDomainsStage<C>
where
    C: ModelClient + Send + Sync + 'static,
{
    fn descriptor(&self) -> &StageDescriptor {
        &self.descriptor
    }

    #[instrument(name = "match_domains", skip_all, fields(stage = %self.descriptor.name, attempt = ctx.attempt))]
    async fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutput, ContractError> {
        let stage = self.descriptor.name.as_str();
        let student: StudentProfile = ctx.state.get(stage, &self.descriptor.requires[0])?;
        let alumni: Vec<AlumniProfile> = ctx.state.get(stage, &self.descriptor.requires[1])?;

        let mut matches = rank_matches(
            &student,
            &alumni,
            self.reference_year,
            self.min_score,
            self.top_k,
        );
        info!(considered = alumni.len(), matched = matches.len(), "alumni scored");

        let mut notes = Vec::new();
        let mut model_calls = 0;
        if self.model_insights && !matches.is_empty() {
            model_calls = 1;
            match self.insights(&student, &matches).await {
                Ok(insights) => {
                    debug!(count = insights.len(), "insights received");
                    for m in &mut matches {
                        m.insights = insights.get(&m.alumni.name).cloned();
                    }
                }
                Err(e) if e.is_retryable() && !ctx.is_final_attempt() => return Err(e),
                Err(e) => {
                    warn!(error = %e, "continuing without match insights");
                    notes.push(format!("match insights unavailable: {e}"));
                }
            }
        }

        let mut output = StageOutput::typed(stage, &matches)?.with_model_calls(model_calls);
        output.notes = notes;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{PipelineState, StageKind};
    use model_client::{MockConfig, MockFailure, MockModelClient};
    use serde_json::json;

    fn student() -> StudentProfile {
        serde_json::from_value(json!({
            "name": "Sam Lee",
            "university": "State University",
            "graduation_year": 2025,
            "major": "Computer Science",
            "skills": ["Python", "SQL", "Machine Learning"],
            "interests": ["technology", "fintech"],
            "target_companies": ["Google"],
            "target_roles": ["Software Engineer"]
        }))
        .unwrap()
    }

    fn alumni(name: &str, company: &str, role: &str, years: u32, skills: &[&str]) -> AlumniProfile {
        serde_json::from_value(json!({
            "name": name,
            "current_company": company,
            "current_role": role,
            "industry": "Technology",
            "years_experience": years,
            "skills": skills,
            "email": format!("{}@example.com", name.to_lowercase()),
        }))
        .unwrap()
    }

    #[test]
    fn test_dimension_scores() {
        let targets = vec!["Google".to_string()];
        assert_eq!(company_score(&targets, "Google Cloud"), 1.0);
        assert_eq!(company_score(&targets, "Amazon"), 0.0);
        assert_eq!(company_score(&[], "Amazon"), 0.5);

        let roles = vec!["Software Engineer".to_string()];
        assert_eq!(role_score(&roles, "Senior Software Engineer"), 1.0);
        assert_eq!(role_score(&roles, "Backend Developer"), 0.8);
        assert_eq!(role_score(&roles, "Sales Director"), 0.2);

        assert_eq!(experience_score(2025, 2025, 5), 1.0);
        assert_eq!(experience_score(2025, 2025, 2), 0.8);
        assert_eq!(experience_score(2025, 2025, 12), 0.7);
        assert_eq!(experience_score(2025, 2025, 20), 0.5);
        assert_eq!(experience_score(2020, 2025, 5), 0.3);

        let interests = vec!["technology".to_string()];
        assert_eq!(industry_score(&interests, "Technology"), 1.0);
        assert_eq!(industry_score(&["tech".to_string()], "Technology"), 0.8);
        assert_eq!(industry_score(&interests, "Retail"), 0.3);
        assert_eq!(industry_score(&[], "Retail"), 0.5);
    }

    #[test]
    fn test_grades() {
        let mut a = alumni("Ana", "Google", "Engineer", 8, &[]);
        a.linkedin_url = Some("https://linkedin.com/in/ana".into());
        assert_eq!(referral_potential(&a), Level::High);
        assert_eq!(contact_feasibility(&a), Level::High);

        a.referral_count = 3;
        assert_eq!(referral_potential(&a), Level::Low);

        let b = alumni("Ben", "Google", "Engineer", 4, &[]);
        assert_eq!(referral_potential(&b), Level::Medium);
        assert_eq!(contact_feasibility(&b), Level::Medium);
    }

    #[test]
    fn test_weighted_score() {
        let m = score_alumni(
            &student(),
            &alumni("Ana", "Google", "Software Engineer", 5, &["Python", "SQL", "Go"]),
            2025,
        );
        // skill 2/4, company 1, role 1, experience 1, industry 1
        assert_eq!(m.breakdown.skill, 0.5);
        assert_eq!(m.match_score, 0.85);
        assert_eq!(m.matching_skills, vec!["python", "sql"]);
    }

    #[test]
    fn test_ranking_filters_and_breaks_ties_by_name() {
        let pool = vec![
            alumni("Zoe", "Google", "Software Engineer", 5, &["Python"]),
            alumni("Abe", "Google", "Software Engineer", 5, &["Python"]),
            alumni("Low", "Shop", "Cashier", 0, &[]),
        ];
        let ranked = rank_matches(&student(), &pool, 2025, 0.3, 15);
        let names: Vec<_> = ranked.iter().map(|m| m.alumni.name.as_str()).collect();
        assert_eq!(names, vec!["Abe", "Zoe"]);

        let top1 = rank_matches(&student(), &pool, 2025, 0.3, 1);
        assert_eq!(top1.len(), 1);
    }

    fn seeded() -> PipelineState {
        let mut state = PipelineState::new();
        state.insert_typed("student_profile", &student()).unwrap();
        state
            .insert_typed(
                "alumni",
                &vec![alumni("Ana", "Google", "Software Engineer", 5, &["Python"])],
            )
            .unwrap();
        state
    }

    fn stage(client: MockModelClient) -> MatchDomainsStage<MockModelClient> {
        let cfg = StageConfig::new("match_domains", StageKind::MatchDomains)
            .with_param("reference_year", 2025);
        MatchDomainsStage::from_config(cfg.descriptor(), &cfg, Arc::new(client), Sampling::default())
    }

    fn ctx(state: &PipelineState, attempt: u32) -> StageContext<'_> {
        StageContext {
            run_id: "r",
            attempt,
            max_attempts: 2,
            state,
        }
    }

    #[tokio::test]
    async fn test_insights_attached() {
        let client = MockModelClient::new()
            .with_default_reply(r#"{"insights": {"Ana": "Works on your target team."}}"#);
        let state = seeded();
        let out = stage(client).run(&ctx(&state, 1)).await.unwrap();
        let matches: Vec<AlumniMatch> = serde_json::from_value(out.value).unwrap();
        assert_eq!(matches[0].insights.as_deref(), Some("Works on your target team."));
        assert_eq!(out.model_calls, 1);
    }

    #[tokio::test]
    async fn test_insight_failure_retries_then_degrades() {
        let failing = || {
            MockModelClient::with_config(MockConfig {
                fail_times: 5,
                failure: MockFailure::Transient,
                ..Default::default()
            })
        };
        let state = seeded();

        let err = stage(failing()).run(&ctx(&state, 1)).await.unwrap_err();
        assert!(err.is_retryable());

        let out = stage(failing()).run(&ctx(&state, 2)).await.unwrap();
        let matches: Vec<AlumniMatch> = serde_json::from_value(out.value).unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].insights.is_none());
        assert!(out.notes[0].contains("insights unavailable"));
    }
}
