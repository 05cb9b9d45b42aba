//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。

use contracts::{ContractError, PipelineBlueprint};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// 解析 TOML 格式配置
pub fn parse_toml(content: &str) -> Result<PipelineBlueprint, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 解析 JSON 格式配置
pub fn parse_json(content: &str) -> Result<PipelineBlueprint, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 根据格式解析配置
pub fn parse(content: &str, format: ConfigFormat) -> Result<PipelineBlueprint, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{FailureMode, ModelProvider, PipelineKind, StageKind};

    #[test]
    fn test_parse_toml_minimal() {
        let content = r#"
[pipeline]
name = "analyzer"
kind = "financial"

[[stages]]
name = "load"
kind = "load_images"

[[stages]]
name = "analyze"
kind = "analyze_financials"
"#;
        let result = parse_toml(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.pipeline.kind, PipelineKind::Financial);
        assert_eq!(bp.stages.len(), 2);
        assert_eq!(bp.stages[1].kind, StageKind::AnalyzeFinancials);
        // defaults
        assert_eq!(bp.retry.max_attempts, 3);
        assert_eq!(bp.failure_mode, FailureMode::FailFast);
        assert_eq!(bp.model.provider, ModelProvider::OpenAi);
        assert!(bp.sinks.is_empty());
    }

    #[test]
    fn test_parse_toml_stage_params() {
        let content = r#"
failure_mode = "continue_on_error"

[pipeline]
name = "referrals"
kind = "referral"

[model]
provider = "gemini"
temperature = 0.7

[[stages]]
name = "match"
kind = "match_domains"
[stages.params]
top_k = 5
min_score = 0.4
model_insights = false
"#;
        let bp = parse_toml(content).unwrap();
        assert_eq!(bp.failure_mode, FailureMode::ContinueOnError);
        assert_eq!(bp.model.provider, ModelProvider::Gemini);
        let stage = &bp.stages[0];
        assert_eq!(stage.param_u64("top_k"), Some(5));
        assert_eq!(stage.param_f64("min_score"), Some(0.4));
        assert_eq!(stage.param_bool("model_insights"), Some(false));
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "pipeline": { "name": "p", "kind": "generic", "seeds": ["topic"] },
            "stages": [{
                "name": "outline",
                "kind": "prompt",
                "requires": ["topic"],
                "produces": "outline",
                "params": { "template": "Outline {topic}" }
            }],
            "sinks": [{ "name": "log", "sink_type": "log" }]
        }"#;
        let result = parse_json(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.seed_keys(), vec!["topic"]);
        assert_eq!(bp.sinks[0].queue_capacity, 16);
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let content = "invalid toml [[[";
        let result = parse_toml(content);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_unknown_stage_kind_rejected() {
        let content = r#"
[pipeline]
name = "p"
kind = "financial"

[[stages]]
name = "ocr"
kind = "ocr_text"
"#;
        assert!(parse_toml(content).is_err());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("TOML"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("json"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
