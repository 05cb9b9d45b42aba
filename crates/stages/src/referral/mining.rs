//! Alumni mining: roster filtering, with model-sourced profiles as a fallback

use std::sync::Arc;

use async_trait::async_trait;
use contracts::{
    AlumniProfile, ContractError, MiningCriteria, ModelClient, ModelRequest, Stage, StageConfig,
    StageContext, StageDescriptor, StageOutput,
};
use model_client::extract_json;
use serde::Deserialize;
use tracing::{info, instrument};

use crate::common::Sampling;

const DEFAULT_MAX_ALUMNI: u64 = 20;

/// Whether an alumnus passes every non-empty filter
pub fn matches_criteria(alumni: &AlumniProfile, criteria: &MiningCriteria) -> bool {
    let company = alumni.current_company.trim().to_lowercase();
    let role = alumni.current_role.to_lowercase();

    let company_ok = criteria.target_companies.is_empty()
        || criteria
            .target_companies
            .iter()
            .any(|c| c.trim().to_lowercase() == company);
    let year_ok = criteria.graduation_years.is_empty()
        || criteria.graduation_years.contains(&alumni.graduation_year);
    let role_ok = criteria.roles.is_empty()
        || criteria
            .roles
            .iter()
            .any(|r| role.contains(&r.trim().to_lowercase()));
    let skills_ok = criteria.skills.is_empty()
        || criteria.skills.iter().any(|wanted| {
            alumni
                .skills
                .iter()
                .any(|have| have.trim().eq_ignore_ascii_case(wanted.trim()))
        });

    company_ok && year_ok && role_ok && skills_ok
}

pub struct MineAlumniStage<C> {
    descriptor: StageDescriptor,
    client: Arc<C>,
    sampling: Sampling,
    model_mining: bool,
    max_alumni: usize,
}

#[derive(Debug, Deserialize)]
struct MinedAlumni {
    #[serde(default)]
    alumni: Vec<AlumniProfile>,
}

impl<C> MineAlumniStage<C>
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
            model_mining: config.param_bool("model_mining").unwrap_or(false),
            max_alumni: config.param_u64("max_alumni").unwrap_or(DEFAULT_MAX_ALUMNI) as usize,
        }
    }

    async fn mine_with_model(
        &self,
        criteria: &MiningCriteria,
    ) -> Result<Vec<AlumniProfile>, ContractError> {
        let request = self
            .sampling
            .apply(ModelRequest::new(mining_prompt(criteria, self.max_alumni)))
            .with_context("You are an alumni relations researcher building a referral network.")
            .expecting_json();
        let response = self.client.generate(&request).await?;

        let parsed = extract_json(&response.text)
            .and_then(|v| serde_json::from_value::<MinedAlumni>(v).ok())
            .ok_or_else(|| {
                ContractError::model_response(
                    self.client.provider().as_str(),
                    "alumni reply did not match {\"alumni\": [...]}",
                )
            })?;

        let mut alumni: Vec<AlumniProfile> = parsed
            .alumni
            .into_iter()
            .filter(|a| !a.name.trim().is_empty())
            .collect();
        alumni.truncate(self.max_alumni);
        Ok(alumni)
    }
}

fn mining_prompt(criteria: &MiningCriteria, max: usize) -> String {
    let list = |items: &[String]| {
        if items.is_empty() {
            "any".to_string()
        } else {
            items.join(", ")
        }
    };
    let years = if criteria.graduation_years.is_empty() {
        "any".to_string()
    } else {
        criteria
            .graduation_years
            .iter()
            .map(i32::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "List up to {max} alumni profiles that fit these criteria.\n\n\
         University: {}\n\
         Companies: {}\n\
         Graduation years: {years}\n\
         Roles: {}\n\
         Skills: {}\n\n\
         Respond with JSON only: {{\"alumni\": [{{\"name\": \"\", \"graduation_year\": 0, \
         \"degree\": \"\", \"major\": \"\", \"current_company\": \"\", \"current_role\": \"\", \
         \"industry\": \"\", \"location\": \"\", \"years_experience\": 0, \"skills\": [], \
         \"linkedin_url\": null, \"email\": null, \"willing_to_refer\": true}}]}}",
        criteria.university.as_deref().unwrap_or("any"),
        list(&criteria.target_companies),
        list(&criteria.roles),
        list(&criteria.skills),
    )
}

#[async_trait]
impl<C> Stage for MineAlumniStage<C>
where
    C: ModelClient + Send + Sync + 'static,
{
    fn descriptor(&self) -> &StageDescriptor {
        &self.descriptor
    }

    #[instrument(name = "mine_alumni", skip_all, fields(stage = %self.descriptor.name, attempt = ctx.attempt))]
    async fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutput, ContractError> {
        let stage = self.descriptor.name.as_str();
        let criteria: MiningCriteria = ctx.state.get(stage, &self.descriptor.requires[0])?;
        let roster: Vec<AlumniProfile> = ctx.state.get(stage, &self.descriptor.requires[1])?;

        if roster.is_empty() {
            if !self.model_mining {
                return Ok(StageOutput::typed(stage, &Vec::<AlumniProfile>::new())?
                    .with_note("alumni roster is empty and model mining is disabled"));
            }
            let mined = self.mine_with_model(&criteria).await?;
            info!(mined = mined.len(), "alumni sourced from model");
            return Ok(StageOutput::typed(stage, &mined)?
                .with_model_calls(1)
                .with_note(format!("{} alumni profiles sourced from the model", mined.len())));
        }

        let total = roster.len();
        let selected: Vec<AlumniProfile> = roster
            .into_iter()
            .filter(|a| matches_criteria(a, &criteria))
            .collect();
        info!(roster = total, selected = selected.len(), "alumni filtered");
        StageOutput::typed(stage, &selected)
    }
}
