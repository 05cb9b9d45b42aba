//! Generic prompt stage
//!
//! Renders a template with `{key}` placeholders filled from the declared
//! inputs, sends it to the model and stores the reply.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use contracts::{
    ContractError, ModelClient, ModelRequest, Stage, StageConfig, StageContext, StageDescriptor,
    StageOutput,
};
use model_client::parse_structured;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::common::Sampling;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(\w+)\}").expect("placeholder regex should compile"));

pub struct PromptStage<C> {
    descriptor: StageDescriptor,
    client: Arc<C>,
    sampling: Sampling,
    template: String,
    system: Option<String>,
    parse_json: bool,
}

impl<C> PromptStage<C>
where
    C: ModelClient + Send + Sync + 'static,
{
    /// # Errors
    /// `ConfigValidation` when the `template` param is missing or empty.
    pub fn from_config(
        descriptor: StageDescriptor,
        config: &StageConfig,
        client: Arc<C>,
        sampling: Sampling,
    ) -> Result<Self, ContractError> {
        let template = config
            .param_str("template")
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                ContractError::config_validation(
                    format!("stages.{}.params.template", config.name),
                    "prompt stage needs a non-empty template",
                )
            })?
            .to_string();

        Ok(Self {
            descriptor,
            client,
            sampling,
            template,
            system: config.param_str("system").map(String::from),
            parse_json: config.param_bool("parse_json").unwrap_or(true),
        })
    }

    /// Fill placeholders in a single pass over the template. Inserted values
    /// are never rescanned; placeholders naming undeclared keys stay verbatim.
    fn render(&self, ctx: &StageContext<'_>) -> Result<String, ContractError> {
        let mut values = HashMap::with_capacity(self.descriptor.requires.len());
        for key in &self.descriptor.requires {
            let value = ctx.state.get_raw(key).ok_or_else(|| {
                ContractError::stage_input(&self.descriptor.name, key, "missing from pipeline state")
            })?;
            let text = match value {
                Value::String(s) => s.clone(),
                other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
            };
            values.insert(key.as_str(), text);
        }

        let rendered = PLACEHOLDER.replace_all(&self.template, |caps: &Captures<'_>| {
            values
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        });
        Ok(rendered.into_owned())
    }
}

#[async_trait]
impl<C> Stage for PromptStage<C>
where
    C: ModelClient + Send + Sync + 'static,
{
    fn descriptor(&self) -> &StageDescriptor {
        &self.descriptor
    }

    #[instrument(name = "prompt_stage", skip_all, fields(stage = %self.descriptor.name, attempt = ctx.attempt))]
    async fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutput, ContractError> {
        let prompt = self.render(ctx)?;
        let mut request = self.sampling.apply(ModelRequest::new(prompt));
        if let Some(system) = &self.system {
            request = request.with_context(system.clone());
        }
        if self.parse_json {
            request = request.expecting_json();
        }

        let response = self.client.generate(&request).await?;
        debug!(chars = response.text.len(), "prompt reply received");

        let value = if self.parse_json {
            parse_structured(&response.text)
        } else {
            Value::String(response.text.trim().to_string())
        };
        Ok(StageOutput::new(value).with_model_calls(1))
    }
}
