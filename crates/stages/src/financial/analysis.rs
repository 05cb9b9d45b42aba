//! Vision-model stages: comprehensive analysis and targeted metric extraction

use std::sync::Arc;

use async_trait::async_trait;
use contracts::{
    AnalysisRequest, ContractError, ExtractedMetrics, FinancialAnalysis, LoadedImages,
    MetricEntry, ModelClient, ModelRequest, Stage, StageContext, StageDescriptor, StageOutput,
};
use model_client::{extract_json, parse_structured};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::common::Sampling;

pub const DEFAULT_ANALYSIS_PROMPT: &str = r#"Analyze these financial document images and provide a comprehensive analysis.

Please extract and analyze:

1. Key Financial Metrics: revenue / net interest income, net profit, earnings per share (EPS), return on equity (ROE), cost/income ratio
2. Balance Sheet: total assets, total liabilities, shareholders' equity, loans and advances, deposits
3. Financial Ratios: capital adequacy (CET1, Basel III/IV), liquidity, leverage, cost of risk
4. Performance Trends: quarter-over-quarter and year-over-year changes, growth trends
5. Charts and Graphs: interpret visual data and extract the numbers they show
6. Risk Assessment: credit quality indicators, risk factors mentioned, regulatory compliance status

Respond with JSON only, in this structure:
{
    "executive_summary": "Brief overview of financial health",
    "key_metrics": {
        "revenue": {"value": "", "change": "", "period": ""},
        "net_income": {"value": "", "change": "", "period": ""},
        "eps": {"value": "", "change": "", "period": ""},
        "roe": {"value": "", "target": "", "status": ""}
    },
    "balance_sheet": {
        "total_assets": {"value": "", "change": ""},
        "total_liabilities": {"value": "", "change": ""},
        "equity": {"value": "", "change": ""}
    },
    "financial_ratios": {
        "cost_income_ratio": {"value": "", "target": ""},
        "cet1_ratio": {"value": "", "requirement": ""},
        "leverage_ratio": {"value": "", "requirement": ""}
    },
    "trends_analysis": [],
    "risk_assessment": {
        "credit_quality": "",
        "regulatory_status": "",
        "key_risks": []
    },
    "recommendations": []
}"#;

fn analyst_context(company: &str) -> String {
    format!(
        "You are a senior financial analyst reviewing published results of {company}. \
         Report figures exactly as shown in the documents and leave fields empty when a figure is not visible."
    )
}

fn metrics_prompt(metrics: &[String]) -> String {
    format!(
        "From these financial document images, extract the following specific metrics:\n\n\
         Metrics to find: {}\n\n\
         For each metric, provide:\n\
         - value: current value\n\
         - previous: previous period value (if available)\n\
         - change: percentage change\n\
         - period: time period\n\
         - target: any target or benchmark mentioned\n\n\
         Return JSON with the metric names as keys.",
        metrics.join(", ")
    )
}

/// Inputs shared by both vision stages
fn read_inputs(
    descriptor: &StageDescriptor,
    ctx: &StageContext<'_>,
) -> Result<(AnalysisRequest, LoadedImages), ContractError> {
    let stage = descriptor.name.as_str();
    let request: AnalysisRequest = ctx.state.get(stage, &descriptor.requires[0])?;
    let images: LoadedImages = ctx.state.get(stage, &descriptor.requires[1])?;
    if images.images.is_empty() {
        return Err(ContractError::stage_input(
            stage,
            &descriptor.requires[1],
            "no images to analyze",
        ));
    }
    Ok((request, images))
}

pub struct AnalyzeFinancialsStage<C> {
    descriptor: StageDescriptor,
    client: Arc<C>,
    sampling: Sampling,
}

impl<C> AnalyzeFinancialsStage<C> {
    pub fn new(descriptor: StageDescriptor, client: Arc<C>, sampling: Sampling) -> Self {
        Self {
            descriptor,
            client,
            sampling,
        }
    }
}

#[async_trait]
impl<C> Stage for AnalyzeFinancialsStage<C>
where
    C: ModelClient + Send + Sync + 'static,
{
    fn descriptor(&self) -> &StageDescriptor {
        &self.descriptor
    }

    #[instrument(name = "analyze_financials", skip_all, fields(stage = %self.descriptor.name, attempt = ctx.attempt))]
    async fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutput, ContractError> {
        let (request, images) = read_inputs(&self.descriptor, ctx)?;
        let prompt = request
            .custom_prompt
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ANALYSIS_PROMPT.to_string());

        let model_request = self
            .sampling
            .apply(ModelRequest::new(prompt))
            .with_context(analyst_context(&request.company_name))
            .with_images(images.images.into_iter().map(|i| i.image).collect())
            .expecting_json();

        let response = self.client.generate(&model_request).await?;
        let analysis = FinancialAnalysis::from(parse_structured(&response.text));

        let mut output = StageOutput::typed(&self.descriptor.name, &analysis)?.with_model_calls(1);
        if analysis.is_unstructured() {
            warn!("model reply was not JSON, keeping raw text");
            output = output.with_note("model reply was not JSON; raw text kept under 'analysis'");
        }
        info!(
            company = %request.company_name,
            key_metrics = analysis.key_metrics.len(),
            "analysis complete"
        );
        Ok(output)
    }
}

pub struct ExtractMetricsStage<C> {
    descriptor: StageDescriptor,
    client: Arc<C>,
    sampling: Sampling,
}

impl<C> ExtractMetricsStage<C> {
    pub fn new(descriptor: StageDescriptor, client: Arc<C>, sampling: Sampling) -> Self {
        Self {
            descriptor,
            client,
            sampling,
        }
    }
}

#[async_trait]
impl<C> Stage for ExtractMetricsStage<C>
where
    C: ModelClient + Send + Sync + 'static,
{
    fn descriptor(&self) -> &StageDescriptor {
        &self.descriptor
    }

    #[instrument(name = "extract_metrics", skip_all, fields(stage = %self.descriptor.name, attempt = ctx.attempt))]
    async fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutput, ContractError> {
        let stage = self.descriptor.name.as_str();
        let (request, images) = read_inputs(&self.descriptor, ctx)?;
        if request.metrics.is_empty() {
            return Err(ContractError::stage_input(
                stage,
                &self.descriptor.requires[0],
                "no metrics requested",
            ));
        }

        let model_request = self
            .sampling
            .apply(ModelRequest::new(metrics_prompt(&request.metrics)))
            .with_context(analyst_context(&request.company_name))
            .with_images(images.images.into_iter().map(|i| i.image).collect())
            .expecting_json();

        let response = self.client.generate(&model_request).await?;
        let Some(Value::Object(map)) = extract_json(&response.text) else {
            return Err(ContractError::model_response(
                self.client.provider().as_str(),
                "metric extraction reply contained no JSON object",
            ));
        };

        let metrics: ExtractedMetrics = map
            .into_iter()
            .map(|(name, value)| (name, MetricEntry::from(value)))
            .collect();

        let missing: Vec<&str> = request
            .metrics
            .iter()
            .filter(|wanted| !metrics.keys().any(|k| k.eq_ignore_ascii_case(wanted)))
            .map(String::as_str)
            .collect();

        let mut output = StageOutput::typed(stage, &metrics)?.with_model_calls(1);
        if !missing.is_empty() {
            output = output.with_note(format!("not found in documents: {}", missing.join(", ")));
        }
        info!(found = metrics.len(), missing = missing.len(), "metrics extracted");
        Ok(output)
    }
}
