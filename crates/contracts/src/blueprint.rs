//! PipelineBlueprint - Config Loader 输出
//!
//! 描述完整的管道配置：模型、重试策略、阶段列表、输出路由。
//!
//! 字段顺序：标量在前，表在后（TOML 序列化要求）。

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::{ModelProvider, StageDescriptor};

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的管道配置蓝图
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 单次阶段尝试的超时 (秒)
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,

    /// 阶段失败时的处理方式
    #[serde(default)]
    pub failure_mode: FailureMode,

    /// 管道标识
    pub pipeline: PipelineSection,

    /// 模型设置
    #[serde(default)]
    #[validate(nested)]
    pub model: ModelSettings,

    /// 全局重试策略
    #[serde(default)]
    #[validate(nested)]
    pub retry: RetryPolicy,

    /// 阶段列表 (按执行顺序)
    pub stages: Vec<StageConfig>,

    /// 输出路由配置
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

fn default_stage_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    pub name: String,
    pub kind: PipelineKind,
    /// 覆盖默认的种子键
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seeds: Vec<String>,
}

/// 管道类型，决定种子键与结果聚合方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    Financial,
    Referral,
    Generic,
}

impl PipelineKind {
    /// Keys the caller must supply before the first stage runs
    pub fn default_seeds(&self) -> &'static [&'static str] {
        match self {
            Self::Financial => &["request"],
            Self::Referral => &["student_profile", "mining_criteria", "alumni_roster"],
            Self::Generic => &[],
        }
    }
}

/// 阶段失败策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// 第一个失败的阶段终止整个运行
    #[default]
    FailFast,
    /// 记录失败，跳过依赖它的阶段，继续执行其余阶段
    ContinueOnError,
}

/// 模型设置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ModelSettings {
    #[serde(default)]
    pub provider: ModelProvider,

    /// 模型名称 (缺省按 provider 选择)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// 保存 API key 的环境变量名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// 自定义 endpoint (兼容 OpenAI 的网关等)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_temperature")]
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    #[validate(range(min = 1, max = 128000))]
    pub max_tokens: u32,

    /// 单次 HTTP 请求超时 (秒)
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: ModelProvider::default(),
            model: None,
            api_key_env: None,
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ModelSettings {
    pub fn model_name(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn api_key_env_name(&self) -> Option<&str> {
        self.api_key_env
            .as_deref()
            .or_else(|| self.provider.default_api_key_env())
    }
}

/// 重试策略 (指数退避)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RetryPolicy {
    /// 总尝试次数 (含第一次)
    #[serde(default = "default_max_attempts")]
    #[validate(range(min = 1, max = 10))]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_multiplier")]
    #[validate(range(min = 1.0, max = 10.0))]
    pub multiplier: f64,

    /// 在 [50%, 100%] 区间内随机缩放退避时间
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            multiplier: 1.0,
            jitter: false,
        }
    }

    /// Deterministic policy with a fixed base delay (tests, CLI overrides)
    pub fn fixed(max_attempts: u32, backoff: Duration) -> Self {
        let ms = backoff.as_millis() as u64;
        Self {
            max_attempts,
            initial_backoff_ms: ms,
            max_backoff_ms: ms,
            multiplier: 1.0,
            jitter: false,
        }
    }
}

/// 内置阶段类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    LoadImages,
    AnalyzeFinancials,
    ExtractMetrics,
    ValidateFinancials,
    MineAlumni,
    MatchDomains,
    RecommendPaths,
    GenerateMessages,
    /// 通用提示词阶段：模板 + 模型调用
    Prompt,
}

impl StageKind {
    /// Input keys, bound positionally when overridden in config
    pub fn default_requires(&self) -> &'static [&'static str] {
        match self {
            Self::LoadImages => &["request"],
            Self::AnalyzeFinancials | Self::ExtractMetrics => &["request", "images"],
            Self::ValidateFinancials => &["analysis"],
            Self::MineAlumni => &["mining_criteria", "alumni_roster"],
            Self::MatchDomains => &["student_profile", "alumni"],
            Self::RecommendPaths => &["student_profile", "matches"],
            Self::GenerateMessages => &["student_profile", "paths"],
            Self::Prompt => &[],
        }
    }

    pub fn default_produces(&self) -> Option<&'static str> {
        match self {
            Self::LoadImages => Some("images"),
            Self::AnalyzeFinancials => Some("analysis"),
            Self::ExtractMetrics => Some("metrics"),
            Self::ValidateFinancials => Some("validation"),
            Self::MineAlumni => Some("alumni"),
            Self::MatchDomains => Some("matches"),
            Self::RecommendPaths => Some("paths"),
            Self::GenerateMessages => Some("outreach"),
            Self::Prompt => None,
        }
    }

    /// Whether the stage talks to the hosted model
    pub fn uses_model(&self) -> bool {
        !matches!(
            self,
            Self::LoadImages | Self::ValidateFinancials | Self::RecommendPaths
        )
    }
}

/// 阶段配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,

    pub kind: StageKind,

    /// 覆盖输入键 (缺省使用类型默认值)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<Vec<String>>,

    /// 覆盖输出键
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produces: Option<String>,

    /// 覆盖全局超时 (秒)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// 覆盖全局重试策略
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,

    /// 类型特定参数
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
}

impl StageConfig {
    pub fn new(name: impl Into<String>, kind: StageKind) -> Self {
        Self {
            name: name.into(),
            kind,
            requires: None,
            produces: None,
            timeout_secs: None,
            retry: None,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Resolved data contract
    pub fn descriptor(&self) -> StageDescriptor {
        let requires = self.requires.clone().unwrap_or_else(|| {
            self.kind
                .default_requires()
                .iter()
                .map(|s| s.to_string())
                .collect()
        });
        let produces = self
            .produces
            .clone()
            .or_else(|| self.kind.default_produces().map(String::from))
            .unwrap_or_default();
        StageDescriptor {
            name: self.name.clone(),
            requires,
            produces,
        }
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.params.get(key).and_then(Value::as_f64)
    }

    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.params.get(key).and_then(Value::as_u64)
    }

    pub fn param_bool(&self, key: &str) -> Option<bool> {
        self.params.get(key).and_then(Value::as_bool)
    }
}

/// Sink 输出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink 名称
    pub name: String,

    /// Sink 类型
    pub sink_type: SinkType,

    /// 队列容量
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// 类型特定参数 (output_dir 等)
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    16
}

impl SinkConfig {
    pub fn new(sink_type: SinkType) -> Self {
        Self {
            name: sink_type.as_str().to_string(),
            sink_type,
            queue_capacity: default_queue_capacity(),
            params: HashMap::new(),
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<String>) -> Self {
        self.params.insert("output_dir".to_string(), dir.into());
        self
    }
}

/// Sink 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Markdown 报告文件
    Markdown,
    /// JSON 报告文件
    Json,
    /// 纯文本摘要文件
    Summary,
    /// 日志输出
    Log,
}

impl SinkType {
    pub const ALL: [SinkType; 4] = [Self::Markdown, Self::Json, Self::Summary, Self::Log];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Summary => "summary",
            Self::Log => "log",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "markdown" | "md" => Some(Self::Markdown),
            "json" => Some(Self::Json),
            "summary" | "text" | "txt" => Some(Self::Summary),
            "log" => Some(Self::Log),
            _ => None,
        }
    }
}

impl PipelineBlueprint {
    /// Keys the caller must seed
    pub fn seed_keys(&self) -> Vec<String> {
        if self.pipeline.seeds.is_empty() {
            self.pipeline
                .kind
                .default_seeds()
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            self.pipeline.seeds.clone()
        }
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    /// Standard report-analyzer pipeline; `extract_metrics` is added when
    /// `include_metrics` is set.
    pub fn financial_default(include_metrics: bool) -> Self {
        let mut stages = vec![
            StageConfig::new("load_images", StageKind::LoadImages),
            StageConfig::new("analyze_financials", StageKind::AnalyzeFinancials),
        ];
        if include_metrics {
            stages.push(StageConfig::new("extract_metrics", StageKind::ExtractMetrics));
        }
        stages.push(StageConfig::new(
            "validate_financials",
            StageKind::ValidateFinancials,
        ));

        Self {
            version: ConfigVersion::V1,
            stage_timeout_secs: default_stage_timeout_secs(),
            failure_mode: FailureMode::FailFast,
            pipeline: PipelineSection {
                name: "financial_report_analyzer".to_string(),
                kind: PipelineKind::Financial,
                seeds: Vec::new(),
            },
            model: ModelSettings::default(),
            retry: RetryPolicy::default(),
            stages,
            sinks: Vec::new(),
        }
    }

    /// Standard alumni referral pipeline
    pub fn referral_default() -> Self {
        Self {
            version: ConfigVersion::V1,
            stage_timeout_secs: default_stage_timeout_secs(),
            failure_mode: FailureMode::FailFast,
            pipeline: PipelineSection {
                name: "alumni_referral".to_string(),
                kind: PipelineKind::Referral,
                seeds: Vec::new(),
            },
            model: ModelSettings {
                provider: ModelProvider::Gemini,
                temperature: 0.7,
                ..ModelSettings::default()
            },
            retry: RetryPolicy::default(),
            stages: vec![
                StageConfig::new("mine_alumni", StageKind::MineAlumni),
                StageConfig::new("match_domains", StageKind::MatchDomains),
                StageConfig::new("recommend_paths", StageKind::RecommendPaths),
                StageConfig::new("generate_messages", StageKind::GenerateMessages),
            ],
            sinks: Vec::new(),
        }
    }

    /// Replace sinks with one per requested format
    pub fn with_sinks(mut self, formats: &[SinkType], output_dir: &str) -> Self {
        self.sinks = formats
            .iter()
            .map(|t| SinkConfig::new(*t).with_output_dir(output_dir))
            .collect();
        self
    }
}
