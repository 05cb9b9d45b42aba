//! Stage factory
//!
//! 从 StageConfig 构建具体阶段。

use std::sync::Arc;

use contracts::{
    ContractError, ModelClient, ModelSettings, PipelineBlueprint, Stage, StageConfig, StageKind,
};
use tracing::{debug, instrument};

use crate::common::Sampling;
use crate::financial::{
    AnalyzeFinancialsStage, ExtractMetricsStage, LoadImagesStage, ValidateFinancialsStage,
};
use crate::prompt::PromptStage;
use crate::referral::{
    GenerateMessagesStage, MatchDomainsStage, MineAlumniStage, RecommendPathsStage,
};

/// Build one stage
///
/// # Errors
/// `ConfigValidation` when the resolved contract does not fit the stage
/// kind (too few inputs, no output key, missing required params).
#[instrument(name = "build_stage", skip_all, fields(stage = %config.name, kind = ?config.kind))]
pub fn build_stage<C>(
    config: &StageConfig,
    client: Arc<C>,
    model: &ModelSettings,
) -> Result<Box<dyn Stage>, ContractError>
where
    C: ModelClient + Send + Sync + 'static,
{
    let descriptor = config.descriptor();
    let field = format!("stages.{}", config.name);

    let expected = config.kind.default_requires().len();
    if descriptor.requires.len() < expected {
        return Err(ContractError::config_validation(
            format!("{field}.requires"),
            format!(
                "{:?} stage binds {expected} inputs positionally, got {}",
                config.kind,
                descriptor.requires.len()
            ),
        ));
    }
    if descriptor.produces.is_empty() {
        return Err(ContractError::config_validation(
            format!("{field}.produces"),
            "output key must be set",
        ));
    }

    let sampling = Sampling::resolve(model, config);
    let stage: Box<dyn Stage> = match config.kind {
        StageKind::LoadImages => Box::new(LoadImagesStage::from_config(descriptor, config)?),
        StageKind::AnalyzeFinancials => {
            Box::new(AnalyzeFinancialsStage::new(descriptor, client, sampling))
        }
        StageKind::ExtractMetrics => {
            Box::new(ExtractMetricsStage::new(descriptor, client, sampling))
        }
        StageKind::ValidateFinancials => Box::new(ValidateFinancialsStage::new(descriptor)),
        StageKind::MineAlumni => Box::new(MineAlumniStage::from_config(
            descriptor, config, client, sampling,
        )),
        StageKind::MatchDomains => Box::new(MatchDomainsStage::from_config(
            descriptor, config, client, sampling,
        )),
        StageKind::RecommendPaths => Box::new(RecommendPathsStage::from_config(descriptor, config)),
        StageKind::GenerateMessages => Box::new(GenerateMessagesStage::from_config(
            descriptor, config, client, sampling,
        )),
        StageKind::Prompt => Box::new(PromptStage::from_config(
            descriptor, config, client, sampling,
        )?),
    };

    debug!("stage built");
    Ok(stage)
}

/// Build every stage of a blueprint, in order
pub fn build_stages<C>(
    blueprint: &PipelineBlueprint,
    client: Arc<C>,
) -> Result<Vec<Box<dyn Stage>>, ContractError>
where
    C: ModelClient + Send + Sync + 'static,
{
    blueprint
        .stages
        .iter()
        .map(|config| build_stage(config, Arc::clone(&client), &blueprint.model))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_client::MockModelClient;

    fn client() -> Arc<MockModelClient> {
        Arc::new(MockModelClient::new())
    }

    #[test]
    fn test_build_referral_default() {
        let bp = PipelineBlueprint::referral_default();
        let stages = build_stages(&bp, client()).unwrap();
        let names: Vec<_> = stages.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(
            names,
            vec![
                "mine_alumni",
                "match_domains",
                "recommend_paths",
                "generate_messages"
            ]
        );
        assert_eq!(stages[1].descriptor().produces, "matches");
    }

    #[test]
    fn test_requires_override_too_short() {
        let mut cfg = StageConfig::new("m", StageKind::MatchDomains);
        cfg.requires = Some(vec!["student_profile".into()]);
        let err = build_stage(&cfg, client(), &ModelSettings::default())
            .err()
            .unwrap()
            .to_string();
        assert!(err.contains("binds 2 inputs"), "got: {err}");
    }

    #[test]
    fn test_prompt_without_template_is_rejected() {
        let mut cfg = StageConfig::new("p", StageKind::Prompt);
        cfg.produces = Some("out".into());
        let err = build_stage(&cfg, client(), &ModelSettings::default())
            .err()
            .unwrap()
            .to_string();
        assert!(err.contains("template"), "got: {err}");
    }

    #[test]
    fn test_prompt_without_output_key_is_rejected() {
        let cfg = StageConfig::new("p", StageKind::Prompt).with_param("template", "hi");
        assert!(build_stage(&cfg, client(), &ModelSettings::default()).is_err());
    }
}
