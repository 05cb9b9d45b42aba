//! Financial report analyzer stages

mod analysis;
mod images;
mod validation;

pub use analysis::{AnalyzeFinancialsStage, ExtractMetricsStage, DEFAULT_ANALYSIS_PROMPT};
pub use images::{preprocess_image, LoadImagesStage, Preprocess};
pub use validation::{
    calculate_growth_rate, extract_figures, format_currency, parse_amount,
    standardize_metric_name, validate_analysis, ValidateFinancialsStage, REQUIRED_FIELDS,
};
