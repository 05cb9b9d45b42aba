//! Outreach message generation
//!
//! One model call per channel per recipient. When generation fails on the
//! last permitted attempt (or fails permanently) the built-in template for
//! that channel is used instead and the fallback is noted.

use std::sync::Arc;

use async_trait::async_trait;
use contracts::{
    ContractError, MessageChannel, MessageSource, ModelClient, ModelRequest, OutreachMessage,
    OutreachPlan, RecommendedApproach, ReferralPath, Stage, StageConfig, StageContext,
    StageDescriptor, StageOutput, StudentProfile,
};
use tracing::{info, instrument, warn};

use crate::common::{word_count, Sampling};

const DEFAULT_MAX_RECIPIENTS: u64 = 1;

fn channel_guidance(channel: MessageChannel) -> &'static str {
    match channel {
        MessageChannel::LinkedIn => {
            "Keep it under 150 words, friendly and professional, and end with a light ask for a short conversation."
        }
        MessageChannel::Email => {
            "Start with a line 'Subject: ...'. Keep the body under 220 words, mention a concrete role, \
             and ask politely whether they would consider a referral."
        }
        MessageChannel::FollowUp => {
            "This follows an unanswered first message. Keep it under 90 words, acknowledge they are busy, \
             and restate the ask briefly."
        }
    }
}

fn generation_prompt(student: &StudentProfile, path: &ReferralPath, channel: MessageChannel) -> String {
    let shared = if path.shared_skills.is_empty() {
        "none recorded".to_string()
    } else {
        path.shared_skills.join(", ")
    };
    format!(
        "Write a {} from {} to {}.\n\n\
         Sender: {} {} student at {}, graduating {}. Skills: {}. Target roles: {}.\n\
         Recipient: {} at {} ({} years of experience), a fellow alumnus.\n\
         Shared skills: {shared}.\n\n\
         {}\n\
         Return only the message text.",
        channel.description(),
        student.name,
        path.alumni_name,
        student.degree,
        student.major,
        student.university,
        student.graduation_year,
        student.skills.join(", "),
        student.target_roles.join(", "),
        path.alumni_role,
        path.alumni_company,
        path.years_experience,
        channel_guidance(channel),
    )
}

/// Built-in message for a channel, used when generation is unavailable
pub fn template_message(
    student: &StudentProfile,
    path: &ReferralPath,
    channel: MessageChannel,
) -> (Option<String>, String) {
    let major = if student.major.is_empty() {
        "university"
    } else {
        student.major.as_str()
    };
    match channel {
        MessageChannel::LinkedIn => (
            None,
            format!(
                "Hi {alumni},\n\n\
                 I'm {name}, a {major} student at {uni} graduating in {year}. I came across your profile \
                 and was impressed by your work as {role} at {company}.\n\n\
                 I'm very interested in opportunities at {company} and would appreciate any insights you \
                 might share. Would you be open to a brief conversation?\n\n\
                 Best regards,\n{name}",
                alumni = path.alumni_name,
                name = student.name,
                uni = student.university,
                year = student.graduation_year,
                role = path.alumni_role,
                company = path.alumni_company,
            ),
        ),
        MessageChannel::Email => {
            let contact = student.email.as_deref().unwrap_or_default();
            (
                Some(format!("{major} student from {} seeking career guidance", student.university)),
                format!(
                    "Dear {alumni},\n\n\
                     My name is {name}, and I'm a {major} student at {uni} graduating in {year}. I found your \
                     profile while researching professionals at {company}, and your path to {role} is exactly \
                     the kind of career I hope to build.\n\n\
                     I'm applying for roles at {company} and would be grateful for any advice, or a referral \
                     if you feel comfortable. I'd be happy to work around your schedule for a short call.\n\n\
                     Thank you for considering my request.\n\n\
                     Warm regards,\n{name}\n{contact}",
                    alumni = path.alumni_name,
                    name = student.name,
                    uni = student.university,
                    year = student.graduation_year,
                    role = path.alumni_role,
                    company = path.alumni_company,
                )
                .trim_end()
                .to_string(),
            )
        }
        MessageChannel::FollowUp => (
            None,
            format!(
                "Hi {alumni},\n\n\
                 I wanted to follow up on my previous message. I understand you're busy, but if you have \
                 10-15 minutes in the coming weeks I'd be very grateful for your perspective on {company}.\n\n\
                 Thank you again for your time.\n\n\
                 Best regards,\n{name}",
                alumni = path.alumni_name,
                company = path.alumni_company,
                name = student.name,
            ),
        ),
    }
}

/// Split a leading `Subject:` line off an email body
pub fn split_subject(text: &str) -> (Option<String>, String) {
    let trimmed = text.trim();
    let mut lines = trimmed.lines();
    if let Some(first) = lines.next() {
        let first = first.trim().trim_matches(['*', '#']).trim();
        if let Some(subject) = first
            .strip_prefix("Subject:")
            .or_else(|| first.strip_prefix("subject:"))
        {
            let body = lines.collect::<Vec<_>>().join("\n");
            return (Some(subject.trim().to_string()), body.trim().to_string());
        }
    }
    (None, trimmed.to_string())
}

pub fn key_elements(
    student: &StudentProfile,
    path: &ReferralPath,
    subject: Option<&str>,
    body: &str,
) -> Vec<String> {
    let lower = body.to_lowercase();
    let mentions = |s: &str| !s.trim().is_empty() && lower.contains(&s.trim().to_lowercase());
    let mut elements = Vec::new();

    if subject.is_some() {
        elements.push("Subject line");
    }
    if ["hi ", "dear ", "hello "].iter().any(|g| lower.starts_with(g)) {
        elements.push("Personal greeting");
    }
    if mentions(&student.university) || mentions(&student.major) {
        elements.push("Educational background");
    }
    if mentions(&path.alumni_company) {
        elements.push("Company reference");
    }
    if path.shared_skills.iter().any(|s| mentions(s)) {
        elements.push("Shared skills");
    }
    if lower.contains('?') || lower.contains("referral") || lower.contains("would you") {
        elements.push("Clear ask");
    }
    if student.email.as_deref().is_some_and(mentions) {
        elements.push("Contact information");
    }
    if lower.contains("regards") || lower.contains("thank") {
        elements.push("Professional closing");
    }
    elements.into_iter().map(String::from).collect()
}

/// Share of personal details the message actually uses, two decimals
pub fn personalization_score(student: &StudentProfile, path: &ReferralPath, body: &str) -> f64 {
    let lower = body.to_lowercase();
    let mentions = |s: &str| !s.trim().is_empty() && lower.contains(&s.trim().to_lowercase());
    let first_name = path.alumni_name.split_whitespace().next().unwrap_or_default();

    let checks = [
        mentions(first_name),
        mentions(&path.alumni_company),
        mentions(&path.alumni_role),
        path.shared_skills.iter().any(|s| mentions(s)),
        mentions(&student.major),
        mentions(&student.university),
    ];
    let hits = checks.iter().filter(|c| **c).count() as f64;
    (hits / checks.len() as f64 * 100.0).round() / 100.0
}

pub fn recommend_approach(path: &ReferralPath) -> RecommendedApproach {
    let has_email = path.alumni_email.is_some();
    let has_linkedin = path.alumni_linkedin.is_some();
    let email_first = has_email && (path.years_experience >= 10 || !has_linkedin);

    let (primary, alternative) = if email_first {
        (MessageChannel::Email, MessageChannel::LinkedIn)
    } else {
        (MessageChannel::LinkedIn, MessageChannel::Email)
    };

    RecommendedApproach {
        primary_channel: primary,
        alternative_channel: alternative,
        timing_advice: format!(
            "Send Tuesday-Thursday between 9 AM and 5 PM; expect a reply within {}",
            path.estimated_response_time
        ),
        follow_up_schedule: vec![
            "Day 7: send the follow-up message if there is no response".to_string(),
            format!("Day 14: second follow-up via {alternative}"),
            "Day 21: final check-in, then move to the next path".to_string(),
            "Thank-you note immediately after any response".to_string(),
        ],
    }
}

pub struct GenerateMessagesStage<C> {
    descriptor: StageDescriptor,
    client: Arc<C>,
    sampling: Sampling,
    max_recipients: usize,
    channels: Vec<MessageChannel>,
}

impl<C> GenerateMessagesStage<C>
where
    C: ModelClient + Send + Sync + 'static,
{
    pub fn from_config(
        descriptor: StageDescriptor,
        config: &StageConfig,
        client: Arc<C>,
        sampling: Sampling,
    ) -> Self {
        let channels = config
            .params
            .get("channels")
            .and_then(|v| serde_json::from_value::<Vec<MessageChannel>>(v.clone()).ok())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| MessageChannel::ALL.to_vec());
        Self {
            descriptor,
            client,
            sampling,
            max_recipients: config
                .param_u64("max_recipients")
                .unwrap_or(DEFAULT_MAX_RECIPIENTS) as usize,
            channels,
        }
    }

    async fn generate(
        &self,
        student: &StudentProfile,
        path: &ReferralPath,
        channel: MessageChannel,
    ) -> Result<(Option<String>, String), ContractError> {
        let request = self
            .sampling
            .apply(ModelRequest::new(generation_prompt(student, path, channel)))
            .with_context("You write concise, genuine networking messages for students.");
        let response = self.client.generate(&request).await?;
        let text = response.text.trim();
        if text.is_empty() {
            return Err(ContractError::model_response(
                self.client.provider().as_str(),
                "empty message",
            ));
        }
        Ok(match channel {
            MessageChannel::Email => split_subject(text),
            _ => (None, text.to_string()),
        })
    }
}

#[async_trait]
impl<C> Stage for GenerateMessagesStage<C>
where
    C: ModelClient + Send + Sync + 'static,
{
    fn descriptor(&self) -> &StageDescriptor {
        &self.descriptor
    }

    #[instrument(name = "generate_messages", skip_all, fields(stage = %self.descriptor.name, attempt = ctx.attempt))]
    async fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutput, ContractError> {
        let stage = self.descriptor.name.as_str();
        let student: StudentProfile = ctx.state.get(stage, &self.descriptor.requires[0])?;
        let paths: Vec<ReferralPath> = ctx.state.get(stage, &self.descriptor.requires[1])?;

        let mut plans = Vec::new();
        let mut notes = Vec::new();
        let mut model_calls = 0;

        for path in paths.iter().take(self.max_recipients) {
            let mut messages = Vec::with_capacity(self.channels.len());
            for &channel in &self.channels {
                model_calls += 1;
                let (subject, body, source) = match self.generate(&student, path, channel).await {
                    Ok((subject, body)) => (subject, body, MessageSource::Model),
                    Err(e) if e.is_retryable() && !ctx.is_final_attempt() => return Err(e),
                    Err(e) => {
                        warn!(channel = %channel, recipient = %path.alumni_name, error = %e, "using message template");
                        notes.push(format!(
                            "{channel} message for {} uses the built-in template: {e}",
                            path.alumni_name
                        ));
                        let (subject, body) = template_message(&student, path, channel);
                        (subject, body, MessageSource::Template)
                    }
                };

                messages.push(OutreachMessage {
                    channel,
                    key_elements: key_elements(&student, path, subject.as_deref(), &body),
                    personalization_score: personalization_score(&student, path, &body),
                    word_count: word_count(&body),
                    subject,
                    body,
                    source,
                });
            }

            plans.push(OutreachPlan {
                recipient: path.alumni_name.clone(),
                company: path.alumni_company.clone(),
                messages,
                approach: recommend_approach(path),
            });
        }

        if paths.is_empty() {
            notes.push("no referral paths to write messages for".to_string());
        }
        info!(recipients = plans.len(), model_calls, "outreach prepared");

        let mut output = StageOutput::typed(stage, &plans)?.with_model_calls(model_calls);
        output.notes = notes;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Level, PathEvaluation, PathType, PipelineState, StageKind};
    use model_client::{MockConfig, MockFailure, MockModelClient};
    use serde_json::json;

    fn student() -> StudentProfile {
        serde_json::from_value(json!({
            "name": "Sam Lee",
            "university": "State University",
            "graduation_year": 2025,
            "major": "Computer Science",
            "skills": ["Python"],
            "email": "sam@state.edu"
        }))
        .unwrap()
    }

    fn path(name: &str, years: u32) -> ReferralPath {
        ReferralPath {
            path_id: "path_1".into(),
            alumni_name: name.into(),
            alumni_company: "Google".into(),
            alumni_role: "Software Engineer".into(),
            path_type: PathType::Direct,
            connection_strength: 0.8,
            success_probability: 0.8,
            estimated_response_time: "1-3 days".into(),
            evaluation: PathEvaluation::default(),
            path_score: 0.8,
            confidence: Level::High,
            risk_factors: Vec::new(),
            next_steps: Vec::new(),
            alumni_email: Some("ana@google.com".into()),
            alumni_linkedin: Some("https://linkedin.com/in/ana".into()),
            shared_skills: vec!["python".into()],
            years_experience: years,
        }
    }

    fn seeded(paths: Vec<ReferralPath>) -> PipelineState {
        let mut state = PipelineState::new();
        state.insert_typed("student_profile", &student()).unwrap();
        state.insert_typed("paths", &paths).unwrap();
        state
    }

    fn stage(client: MockModelClient) -> GenerateMessagesStage<MockModelClient> {
        let cfg = StageConfig::new("generate_messages", StageKind::GenerateMessages);
        GenerateMessagesStage::from_config(cfg.descriptor(), &cfg, Arc::new(client), Sampling::default())
    }

    fn ctx(state: &PipelineState, attempt: u32) -> StageContext<'_> {
        StageContext {
            run_id: "r",
            attempt,
            max_attempts: 2,
            state,
        }
    }

    #[test]
    fn test_split_subject() {
        let (s, body) = split_subject("**Subject: Hello from State**\n\nDear Ana,\nHi.");
        assert_eq!(s.as_deref(), Some("Hello from State"));
        assert_eq!(body, "Dear Ana,\nHi.");

        let (s, body) = split_subject("Dear Ana");
        assert!(s.is_none());
        assert_eq!(body, "Dear Ana");
    }

    #[test]
    fn test_templates_are_personalized() {
        let p = path("Ana Diaz", 4);
        for channel in MessageChannel::ALL {
            let (subject, body) = template_message(&student(), &p, channel);
            assert!(body.contains("Ana Diaz"), "{channel}: {body}");
            assert!(body.contains("Google"));
            assert_eq!(subject.is_some(), channel == MessageChannel::Email);
        }
        let (_, email) = template_message(&student(), &p, MessageChannel::Email);
        assert!(email.ends_with("sam@state.edu"));
        let elements = key_elements(&student(), &p, Some("x"), &email);
        assert!(elements.contains(&"Contact information".to_string()));
        assert!(elements.contains(&"Subject line".to_string()));
    }

    #[test]
    fn test_personalization_score() {
        let p = path("Ana Diaz", 4);
        let body = "Hi Ana, as a Computer Science student at State University I loved your Python work at Google as a Software Engineer.";
        assert_eq!(personalization_score(&student(), &p, body), 1.0);
        assert_eq!(personalization_score(&student(), &p, "Hello there"), 0.0);
    }

    #[test]
    fn test_approach_prefers_email_for_seniors() {
        assert_eq!(
            recommend_approach(&path("A", 12)).primary_channel,
            MessageChannel::Email
        );
        let junior = recommend_approach(&path("A", 3));
        assert_eq!(junior.primary_channel, MessageChannel::LinkedIn);
        assert_eq!(junior.follow_up_schedule.len(), 4);
        assert!(junior.timing_advice.contains("1-3 days"));
    }

    #[tokio::test]
    async fn test_model_messages_for_top_recipient_only() {
        let client = MockModelClient::new().with_responder(|req| {
            if req.prompt.contains("email requesting") {
                "Subject: Referral request\n\nDear Ana, would you refer me?".to_string()
            } else {
                "Hi Ana, thanks!".to_string()
            }
        });
        let state = seeded(vec![path("Ana", 4), path("Ben", 6)]);
        let out = stage(client).run(&ctx(&state, 1)).await.unwrap();
        let plans: Vec<OutreachPlan> = serde_json::from_value(out.value).unwrap();

        assert_eq!(plans.len(), 1);
        assert_eq!(out.model_calls, 3);
        let email = plans[0]
            .messages
            .iter()
            .find(|m| m.channel == MessageChannel::Email)
            .unwrap();
        assert_eq!(email.subject.as_deref(), Some("Referral request"));
        assert_eq!(email.source, MessageSource::Model);
        assert!(email.key_elements.contains(&"Clear ask".to_string()));
        assert!(out.notes.is_empty());
    }

    #[tokio::test]
    async fn test_template_fallback_on_final_attempt() {
        let failing = || {
            MockModelClient::with_config(MockConfig {
                fail_times: 10,
                failure: MockFailure::Transient,
                ..Default::default()
            })
        };
        let state = seeded(vec![path("Ana", 4)]);

        assert!(stage(failing()).run(&ctx(&state, 1)).await.is_err());

        let out = stage(failing()).run(&ctx(&state, 2)).await.unwrap();
        let plans: Vec<OutreachPlan> = serde_json::from_value(out.value).unwrap();
        assert_eq!(plans[0].messages.len(), 3);
        assert!(plans[0]
            .messages
            .iter()
            .all(|m| m.source == MessageSource::Template));
        assert_eq!(out.notes.len(), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_degrades_immediately() {
        let client = MockModelClient::with_config(MockConfig {
            fail_times: 10,
            failure: MockFailure::Permanent,
            ..Default::default()
        });
        let state = seeded(vec![path("Ana", 4)]);
        let out = stage(client).run(&ctx(&state, 1)).await.unwrap();
        assert_eq!(out.notes.len(), 3);
    }

    #[tokio::test]
    async fn test_no_paths() {
        let state = seeded(Vec::new());
        let out = stage(MockModelClient::new()).run(&ctx(&state, 1)).await.unwrap();
        assert_eq!(out.value, json!([]));
        assert_eq!(out.model_calls, 0);
    }
}
