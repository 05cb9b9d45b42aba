//! Alumni referral types
//!
//! Mining -> matching -> path recommendation -> outreach. Every score here
//! is in `0.0..=1.0`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Student looking for referrals (seed key `student_profile`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub name: String,
    pub university: String,
    pub graduation_year: i32,
    #[serde(default)]
    pub degree: String,
    #[serde(default)]
    pub major: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub target_companies: Vec<String>,
    #[serde(default)]
    pub target_roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_max_referrals() -> u32 {
    3
}

/// Alumnus as known from the roster or mined by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlumniProfile {
    pub name: String,
    #[serde(default)]
    pub graduation_year: i32,
    #[serde(default)]
    pub degree: String,
    #[serde(default)]
    pub major: String,
    #[serde(default)]
    pub current_company: String,
    #[serde(default)]
    pub current_role: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub years_experience: u32,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default = "default_true")]
    pub willing_to_refer: bool,
    #[serde(default)]
    pub referral_count: u32,
    #[serde(default = "default_max_referrals")]
    pub max_referrals_per_year: u32,
}

impl AlumniProfile {
    pub fn has_capacity(&self) -> bool {
        self.referral_count < self.max_referrals_per_year
    }
}

/// Filters applied when mining alumni (seed key `mining_criteria`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MiningCriteria {
    #[serde(default)]
    pub target_companies: Vec<String>,
    #[serde(default)]
    pub graduation_years: Vec<i32>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub university: Option<String>,
}

/// Coarse grade
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Low,
    Medium,
    High,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(s)
    }
}

/// Per-dimension match scores
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub skill: f64,
    pub company: f64,
    pub role: f64,
    pub experience: f64,
    pub industry: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlumniMatch {
    pub alumni: AlumniProfile,
    pub match_score: f64,
    pub breakdown: ScoreBreakdown,
    #[serde(default)]
    pub matching_skills: Vec<String>,
    pub referral_potential: Level,
    pub contact_feasibility: Level,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insights: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathType {
    /// Alumnus works where the student wants to be
    Direct,
    /// Alumnus elsewhere, connected through shared skills
    SkillBased,
}

impl PathType {
    /// Prior success probability before adjustments
    pub fn base_success_probability(&self) -> f64 {
        match self {
            Self::Direct => 0.6,
            Self::SkillBased => 0.5,
        }
    }
}

impl fmt::Display for PathType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::SkillBased => f.write_str("skill_based"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PathEvaluation {
    pub accessibility: f64,
    pub influence: f64,
    pub responsiveness: f64,
    pub relevance: f64,
    pub timing: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferralPath {
    pub path_id: String,
    pub alumni_name: String,
    pub alumni_company: String,
    pub alumni_role: String,
    pub path_type: PathType,
    pub connection_strength: f64,
    pub success_probability: f64,
    pub estimated_response_time: String,
    pub evaluation: PathEvaluation,
    pub path_score: f64,
    pub confidence: Level,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alumni_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alumni_linkedin: Option<String>,
    #[serde(default)]
    pub shared_skills: Vec<String>,
    #[serde(default)]
    pub years_experience: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageChannel {
    #[serde(rename = "linkedin")]
    LinkedIn,
    Email,
    FollowUp,
}

impl MessageChannel {
    pub const ALL: [MessageChannel; 3] = [Self::LinkedIn, Self::Email, Self::FollowUp];

    pub fn description(&self) -> &'static str {
        match self {
            Self::LinkedIn => "LinkedIn connection request message",
            Self::Email => "email requesting a referral",
            Self::FollowUp => "follow-up message after no response",
        }
    }
}

impl fmt::Display for MessageChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LinkedIn => f.write_str("linkedin"),
            Self::Email => f.write_str("email"),
            Self::FollowUp => f.write_str("follow_up"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSource {
    Model,
    Template,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutreachMessage {
    pub channel: MessageChannel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
    pub word_count: usize,
    #[serde(default)]
    pub key_elements: Vec<String>,
    pub personalization_score: f64,
    pub source: MessageSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedApproach {
    pub primary_channel: MessageChannel,
    pub alternative_channel: MessageChannel,
    pub timing_advice: String,
    pub follow_up_schedule: Vec<String>,
}

/// Outreach for one recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutreachPlan {
    pub recipient: String,
    pub company: String,
    pub messages: Vec<OutreachMessage>,
    pub approach: RecommendedApproach,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferralSummary {
    pub alumni_considered: usize,
    pub matches_found: usize,
    pub high_potential_matches: usize,
    pub paths_recommended: usize,
    pub messages_generated: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_recommendation: Option<String>,
}

/// Aggregated referral result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferralReport {
    pub student: StudentProfile,
    pub generated_at: DateTime<Utc>,
    pub matches: Vec<AlumniMatch>,
    #[serde(default)]
    pub paths: Vec<ReferralPath>,
    #[serde(default)]
    pub outreach: Vec<OutreachPlan>,
    pub summary: ReferralSummary,
}
