//! Financial report analysis types
//!
//! The model is asked for a fixed JSON schema but replies are not trusted to
//! honor it: numbers come back as strings and vice versa, metric entries are
//! sometimes bare scalars, extra sections appear. Deserialization here is
//! therefore lenient (via `From<Value>`) and never fails on shape.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Input of the financial pipeline (seed key `request`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub company_name: String,
    /// Local paths or http(s) URLs
    pub image_sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
    /// Specific metrics to extract (empty = comprehensive analysis only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<String>,
}

impl AnalysisRequest {
    pub fn new(company_name: impl Into<String>, image_sources: Vec<String>) -> Self {
        Self {
            company_name: company_name.into(),
            image_sources,
            custom_prompt: None,
            metrics: Vec::new(),
        }
    }
}

/// A figure as reported (value, delta, period, target ...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct MetricEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl MetricEntry {
    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Default::default()
        }
    }
}

impl From<Value> for MetricEntry {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self {
                value: pick(&map, &["value", "current_value", "current"]),
                previous: pick(&map, &["previous", "previous_value", "prior"]),
                change: pick(&map, &["change", "change_percent", "percentage_change"]),
                period: pick(&map, &["period"]),
                target: pick(&map, &["target", "requirement", "target_requirement"]),
                status: pick(&map, &["status"]),
            },
            other => Self {
                value: scalar_text(&other),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct RiskAssessment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit_quality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regulatory_status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_risks: Vec<String>,
}

impl From<Value> for RiskAssessment {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self {
                credit_quality: pick(&map, &["credit_quality"]),
                regulatory_status: pick(&map, &["regulatory_status"]),
                key_risks: map.get("key_risks").map(text_list).unwrap_or_default(),
            },
            other => Self {
                key_risks: text_list(&other),
                ..Default::default()
            },
        }
    }
}

/// Structured analysis returned by the vision model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct FinancialAnalysis {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executive_summary: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub key_metrics: BTreeMap<String, MetricEntry>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub balance_sheet: BTreeMap<String, MetricEntry>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub financial_ratios: BTreeMap<String, MetricEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trends_analysis: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_assessment: Option<RiskAssessment>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<String>,
    /// Raw reply text when the model did not return JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    /// Sections outside the requested schema
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

const ANALYSIS_FIELDS: &[&str] = &[
    "executive_summary",
    "key_metrics",
    "balance_sheet",
    "financial_ratios",
    "trends_analysis",
    "risk_assessment",
    "recommendations",
    "analysis",
];

impl FinancialAnalysis {
    /// Nothing but raw text came back
    pub fn is_unstructured(&self) -> bool {
        self.analysis.is_some()
            && self.executive_summary.is_none()
            && self.key_metrics.is_empty()
            && self.balance_sheet.is_empty()
            && self.financial_ratios.is_empty()
    }
}

impl From<Value> for FinancialAnalysis {
    fn from(value: Value) -> Self {
        let Value::Object(map) = value else {
            return Self {
                analysis: scalar_text(&value),
                ..Default::default()
            };
        };

        let extra = map
            .iter()
            .filter(|(k, _)| !ANALYSIS_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Self {
            executive_summary: pick(&map, &["executive_summary"]),
            key_metrics: metric_map(map.get("key_metrics")),
            balance_sheet: metric_map(map.get("balance_sheet")),
            financial_ratios: metric_map(map.get("financial_ratios")),
            trends_analysis: map.get("trends_analysis").map(text_list).unwrap_or_default(),
            risk_assessment: map
                .get("risk_assessment")
                .filter(|v| !v.is_null())
                .cloned()
                .map(RiskAssessment::from),
            recommendations: map.get("recommendations").map(text_list).unwrap_or_default(),
            analysis: pick(&map, &["analysis"]),
            extra,
        }
    }
}

/// Metrics extracted on request, keyed by metric name
pub type ExtractedMetrics = BTreeMap<String, MetricEntry>;

/// Output of `load_images`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadedImages {
    pub images: Vec<LoadedImage>,
    #[serde(default)]
    pub skipped: Vec<SkippedImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedImage {
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub image: crate::ImageInput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedImage {
    pub source: String,
    pub reason: String,
}

/// Figures pulled out of free text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFigures {
    #[serde(default)]
    pub currencies: Vec<String>,
    #[serde(default)]
    pub percentages: Vec<String>,
    #[serde(default)]
    pub ratios: Vec<String>,
}

/// Output of `validate_financials`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationFindings {
    /// Original metric name -> canonical name
    pub standardized_metrics: BTreeMap<String, String>,
    pub missing_fields: Vec<String>,
    pub warnings: Vec<String>,
    pub figures: ExtractedFigures,
    /// Growth (%) recomputed from current and previous values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub derived_changes: BTreeMap<String, f64>,
}

impl ValidationFindings {
    pub fn is_complete(&self) -> bool {
        self.missing_fields.is_empty()
    }
}

/// Aggregated financial result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialReport {
    pub company_name: String,
    pub generated_at: DateTime<Utc>,
    pub image_sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_images: Vec<SkippedImage>,
    pub analysis: FinancialAnalysis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ExtractedMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationFindings>,
}

fn pick(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find_map(scalar_text)
}

/// Render a JSON scalar as display text; null / empty yields `None`
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn text_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
        other => scalar_text(other).into_iter().collect(),
    }
}

fn metric_map(value: Option<&Value>) -> BTreeMap<String, MetricEntry> {
    match value {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| (k.clone(), MetricEntry::from(v.clone())))
            .collect(),
        _ => BTreeMap::new(),
    }
}
