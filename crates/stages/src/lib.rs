//! # Stages
//!
//! Concrete pipeline stages.
//!
//! Responsibilities:
//! - Financial report analysis: image loading, vision analysis, metric
//!   extraction, rule-based validation
//! - Alumni referral: mining, domain matching, path recommendation,
//!   outreach message generation
//! - Generic prompt stage for custom pipelines
//! - Build any of the above from a `StageConfig`

mod common;
pub mod factory;
pub mod financial;
pub mod prompt;
pub mod referral;

pub use common::Sampling;
pub use factory::{build_stage, build_stages};
pub use financial::{
    calculate_growth_rate, format_currency, AnalyzeFinancialsStage, ExtractMetricsStage,
    LoadImagesStage, ValidateFinancialsStage,
};
pub use prompt::PromptStage;
pub use referral::{
    GenerateMessagesStage, MatchDomainsStage, MineAlumniStage, RecommendPathsStage,
};
