//! Rule-based checks over the model's analysis
//!
//! No model call. Metric names are mapped onto a canonical vocabulary, the
//! required fields are checked, a few sanity rules run, and currency /
//! percentage figures are pulled out of the narrative text.

use std::collections::BTreeMap;

use async_trait::async_trait;
use contracts::{
    ContractError, ExtractedFigures, FinancialAnalysis, MetricEntry, Stage, StageContext,
    StageDescriptor, StageOutput, ValidationFindings,
};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument};

/// Fields every complete analysis reports
pub const REQUIRED_FIELDS: &[&str] = &["revenue", "net_income", "total_assets", "total_liabilities"];

/// Relative tolerance for assets = liabilities + equity
const BALANCE_TOLERANCE: f64 = 0.02;

const METRIC_SYNONYMS: &[(&str, &[&str])] = &[
    ("net_income", &["net profit", "net income", "profit after tax"]),
    ("revenue", &["total revenue", "net revenue", "revenue", "sales", "turnover"]),
    ("eps", &["earnings per share", "earning per share", "eps"]),
    ("roe", &["return on equity", "return on shareholders equity", "roe"]),
    ("roa", &["return on assets", "roa"]),
    ("cost_income_ratio", &["cost income ratio", "cost/income ratio", "efficiency ratio"]),
    ("cet1_ratio", &["common equity tier 1 ratio", "cet1 ratio", "cet1", "capital ratio"]),
    ("leverage_ratio", &["tier 1 leverage ratio", "leverage ratio"]),
    ("equity", &["shareholders equity", "total equity", "equity"]),
];

static AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(-?\d[\d,]*(?:\.\d+)?)(?:\s*(billion|bn|million|mn|thousand|[bmk])\b)?")
        .expect("amount regex should compile")
});
static PERCENT_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(-?\d+(?:\.\d+)?)\s*%").expect("percent regex should compile"));
static PERCENT_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\bper\s?cent\b").expect("percent word regex should compile"));
static CURRENCIES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:EUR|USD|GBP|JPY)\s*[\d,]+(?:\.\d+)?(?:\s*(?:million|billion|M|B)\b)?")
        .expect("currency regex should compile")
});
static PERCENTAGES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?%").expect("percentage regex should compile"));
static RATIOS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d+(?:\.\d+)?\s*:\s*\d+(?:\.\d+)?\b").expect("ratio regex should compile")
});

/// Canonical name of a reported metric
pub fn standardize_metric_name(raw: &str) -> String {
    let normalized = raw
        .to_lowercase()
        .replace(['_', '-'], " ")
        .replace('\'', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let padded = format!(" {normalized} ");

    for (canonical, variations) in METRIC_SYNONYMS {
        if variations
            .iter()
            .any(|v| normalized == *v || padded.contains(&format!(" {v} ")))
        {
            return (*canonical).to_string();
        }
    }
    normalized.replace([' ', '/'], "_")
}

/// Numeric value of a reported amount, scale suffixes applied
///
/// `"EUR 5.2B"` -> 5.2e9, `"1,250 million"` -> 1.25e9, `"-3.4%"` -> -3.4.
pub fn parse_amount(text: &str) -> Option<f64> {
    let caps = AMOUNT.captures(text)?;
    let number: f64 = caps.get(1)?.as_str().replace(',', "").parse().ok()?;
    let scale = match caps.get(2).map(|m| m.as_str().to_lowercase()) {
        Some(s) if s == "b" || s == "bn" || s == "billion" => 1e9,
        Some(s) if s == "m" || s == "mn" || s == "million" => 1e6,
        Some(s) if s == "k" || s == "thousand" => 1e3,
        _ => 1.0,
    };
    Some(number * scale)
}

/// Percentage growth from `previous` to `current`, two decimals
///
/// `None` when either side does not parse or `previous` is zero.
pub fn calculate_growth_rate(current: &str, previous: &str) -> Option<f64> {
    let current = parse_amount(current)?;
    let previous = parse_amount(previous)?;
    if previous == 0.0 {
        return None;
    }
    let rate = (current - previous) / previous.abs() * 100.0;
    Some((rate * 100.0).round() / 100.0)
}

/// `5_200_000_000.0, "EUR"` -> `"EUR 5.2B"`
pub fn format_currency(amount: f64, currency: &str) -> String {
    let magnitude = amount.abs();
    if magnitude >= 1e9 {
        format!("{currency} {:.1}B", amount / 1e9)
    } else if magnitude >= 1e6 {
        format!("{currency} {:.1}M", amount / 1e6)
    } else if magnitude >= 1e3 {
        format!("{currency} {:.1}K", amount / 1e3)
    } else {
        format!("{currency} {amount:.2}")
    }
}

/// Currency, percentage and ratio figures found in free text
pub fn extract_figures(text: &str) -> ExtractedFigures {
    let cleaned = text
        .replace('€', "EUR ")
        .replace('$', "USD ")
        .replace('£', "GBP ");
    let cleaned = PERCENT_WORD.replace_all(&cleaned, "%");

    ExtractedFigures {
        currencies: unique(CURRENCIES.find_iter(&cleaned).map(|m| m.as_str().trim())),
        percentages: unique(PERCENTAGES.find_iter(&cleaned).map(|m| m.as_str())),
        ratios: unique(RATIOS.find_iter(&cleaned).map(|m| m.as_str())),
    }
}

fn unique<'a>(items: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.iter().any(|seen| seen == item) {
            out.push(item.to_string());
        }
    }
    out
}

/// Run every rule over an analysis
pub fn validate_analysis(analysis: &FinancialAnalysis) -> ValidationFindings {
    let mut findings = ValidationFindings::default();

    if analysis.is_unstructured() {
        findings
            .warnings
            .push("analysis is unstructured text; reported metrics could not be checked".into());
    }

    // first occurrence wins across sections
    let mut metrics: BTreeMap<String, &MetricEntry> = BTreeMap::new();
    let sections = [
        &analysis.key_metrics,
        &analysis.balance_sheet,
        &analysis.financial_ratios,
    ];
    for (name, entry) in sections.into_iter().flatten() {
        let canonical = standardize_metric_name(name);
        findings
            .standardized_metrics
            .insert(name.clone(), canonical.clone());
        metrics.entry(canonical).or_insert(entry);
    }

    let value_of = |key: &str| metrics.get(key).and_then(|m| m.value.as_deref());

    findings.missing_fields = REQUIRED_FIELDS
        .iter()
        .filter(|f| value_of(f).is_none())
        .map(|f| f.to_string())
        .collect();

    if let Some(roe) = value_of("roe").and_then(|v| PERCENT_VALUE.captures(v)) {
        if let Ok(pct) = roe[1].parse::<f64>() {
            if pct > 100.0 {
                findings
                    .warnings
                    .push(format!("ROE seems unusually high: {pct}%"));
            } else if pct < 0.0 {
                findings.warnings.push(format!("Negative ROE detected: {pct}%"));
            }
        }
    }

    if let (Some(assets), Some(liabilities), Some(equity)) = (
        value_of("total_assets"),
        value_of("total_liabilities"),
        value_of("equity"),
    ) {
        match (parse_amount(assets), parse_amount(liabilities), parse_amount(equity)) {
            (Some(a), Some(l), Some(e)) if a != 0.0 => {
                let gap = (a - (l + e)).abs() / a.abs();
                if gap > BALANCE_TOLERANCE {
                    findings.warnings.push(format!(
                        "Balance sheet does not balance: assets {assets} vs liabilities {liabilities} + equity {equity} ({:.1}% apart)",
                        gap * 100.0
                    ));
                }
            }
            _ => findings.warnings.push(
                "Balance sheet equation should be verified: Assets = Liabilities + Equity".into(),
            ),
        }
    }

    for (name, entry) in &metrics {
        if let (Some(current), Some(previous)) = (&entry.value, &entry.previous) {
            if let Some(rate) = calculate_growth_rate(current, previous) {
                findings.derived_changes.insert(name.clone(), rate);
            }
        }
    }

    let mut narrative: Vec<&str> = Vec::new();
    narrative.extend(analysis.executive_summary.as_deref());
    narrative.extend(analysis.trends_analysis.iter().map(String::as_str));
    narrative.extend(analysis.analysis.as_deref());
    findings.figures = extract_figures(&narrative.join("\n"));

    findings
}

pub struct ValidateFinancialsStage {
    descriptor: StageDescriptor,
}

impl ValidateFinancialsStage {
    pub fn new(descriptor: StageDescriptor) -> Self {
        Self { descriptor }
    }
}

#[async_trait]
impl Stage for ValidateFinancialsStage {
    fn descriptor(&self) -> &StageDescriptor {
        &self.descriptor
    }

    #[instrument(name = "validate_financials", skip_all, fields(stage = %self.descriptor.name))]
    async fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutput, ContractError> {
        let stage = self.descriptor.name.as_str();
        let analysis: FinancialAnalysis = ctx.state.get(stage, &self.descriptor.requires[0])?;
        let findings = validate_analysis(&analysis);

        debug!(
            missing = findings.missing_fields.len(),
            warnings = findings.warnings.len(),
            "validation finished"
        );

        let mut output = StageOutput::typed(stage, &findings)?;
        if !findings.is_complete() {
            output = output.with_note(format!(
                "missing required fields: {}",
                findings.missing_fields.join(", ")
            ));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_standardize_names() {
        assert_eq!(standardize_metric_name("Net Profit"), "net_income");
        assert_eq!(standardize_metric_name("net_income"), "net_income");
        assert_eq!(standardize_metric_name("Total Revenue"), "revenue");
        assert_eq!(standardize_metric_name("Return on Equity"), "roe");
        assert_eq!(standardize_metric_name("Cost/Income Ratio"), "cost_income_ratio");
        assert_eq!(standardize_metric_name("CET1"), "cet1_ratio");
        assert_eq!(standardize_metric_name("Shareholders' Equity"), "equity");
        assert_eq!(standardize_metric_name("Total Assets"), "total_assets");
        assert_eq!(standardize_metric_name("Loans/Deposits"), "loans_deposits");
        // whole words only
        assert_eq!(standardize_metric_name("heroes"), "heroes");
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("EUR 5.2B"), Some(5.2e9));
        assert_eq!(parse_amount("1,250 million"), Some(1.25e9));
        assert_eq!(parse_amount("-3.4%"), Some(-3.4));
        assert_eq!(parse_amount("12 months"), Some(12.0));
        assert_eq!(parse_amount("n/a"), None);
    }

    #[test]
    fn test_growth_rate() {
        assert_eq!(calculate_growth_rate("EUR 5.5B", "EUR 5.0B"), Some(10.0));
        assert_eq!(calculate_growth_rate("4,800M", "5.0B"), Some(-4.0));
        assert_eq!(calculate_growth_rate("10", "3"), Some(233.33));
        assert_eq!(calculate_growth_rate("10", "0"), None);
        assert_eq!(calculate_growth_rate("n/a", "3"), None);
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(5_200_000_000.0, "EUR"), "EUR 5.2B");
        assert_eq!(format_currency(3_450_000.0, "USD"), "USD 3.5M");
        assert_eq!(format_currency(12_300.0, "GBP"), "GBP 12.3K");
        assert_eq!(format_currency(99.5, "EUR"), "EUR 99.50");
        assert_eq!(format_currency(-2_000_000.0, "EUR"), "EUR -2.0M");
    }

    #[test]
    fn test_extract_figures() {
        let f = extract_figures(
            "Revenue reached €5.2 billion, up 4.5 percent; CET1 at 15.1%. Payout 3:1. $120 million buyback.",
        );
        assert_eq!(f.currencies, vec!["EUR 5.2 billion", "USD 120 million"]);
        assert_eq!(f.percentages, vec!["4.5%", "15.1%"]);
        assert_eq!(f.ratios, vec!["3:1"]);
    }

    #[test]
    fn test_validate_complete_analysis() {
        let analysis = FinancialAnalysis::from(json!({
            "executive_summary": "Net income of EUR 1.1B, ROE 12%.",
            "key_metrics": {
                "Total Revenue": {"value": "EUR 5.5B", "previous": "EUR 5.0B"},
                "Net Profit": {"value": "EUR 1.1B"},
                "roe": {"value": "12%"}
            },
            "balance_sheet": {
                "total_assets": {"value": "EUR 100B"},
                "total_liabilities": {"value": "EUR 90B"},
                "equity": {"value": "EUR 10B"}
            }
        }));
        let findings = validate_analysis(&analysis);

        assert!(findings.is_complete(), "missing: {:?}", findings.missing_fields);
        assert!(findings.warnings.is_empty(), "warnings: {:?}", findings.warnings);
        assert_eq!(findings.standardized_metrics["Net Profit"], "net_income");
        assert_eq!(findings.derived_changes["revenue"], 10.0);
        assert_eq!(findings.figures.percentages, vec!["12%"]);
    }

    #[test]
    fn test_validate_flags_problems() {
        let analysis = FinancialAnalysis::from(json!({
            "key_metrics": {"roe": {"value": "140%"}},
            "balance_sheet": {
                "total_assets": {"value": "EUR 100B"},
                "total_liabilities": {"value": "EUR 70B"},
                "equity": {"value": "EUR 10B"}
            }
        }));
        let findings = validate_analysis(&analysis);

        assert_eq!(findings.missing_fields, vec!["revenue", "net_income"]);
        assert!(findings.warnings.iter().any(|w| w.contains("unusually high: 140%")));
        assert!(findings.warnings.iter().any(|w| w.contains("does not balance")));
    }

    #[test]
    fn test_unparseable_balance_sheet_asks_for_verification() {
        let analysis = FinancialAnalysis::from(json!({
            "balance_sheet": {
                "total_assets": {"value": "see note 4"},
                "total_liabilities": {"value": "n/a"},
                "equity": {"value": "n/a"}
            }
        }));
        let findings = validate_analysis(&analysis);
        assert!(findings
            .warnings
            .iter()
            .any(|w| w.contains("should be verified")));
    }

    #[test]
    fn test_unstructured_analysis() {
        let analysis = FinancialAnalysis::from(json!({"analysis": "Revenue was USD 3 million, -2%"}));
        let findings = validate_analysis(&analysis);
        assert_eq!(findings.missing_fields.len(), REQUIRED_FIELDS.len());
        assert!(findings.warnings[0].contains("unstructured"));
        assert_eq!(findings.figures.currencies, vec!["USD 3 million"]);
    }
}
