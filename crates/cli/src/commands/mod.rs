//! Command implementations.

mod analyze;
mod check;
mod info;
mod refer;
mod run;
mod validate;

pub use analyze::run_analyze;
pub use check::run_check;
pub use info::run_info;
pub use refer::run_refer;
pub use run::run_pipeline;
pub use validate::run_validate;

use contracts::{PipelineBlueprint, SinkConfig};
use tracing::info;

use crate::cli::{ModelArgs, OutputArgs};

/// Apply `--provider`, `--model`, `--max-attempts` and the output flags to a
/// standard blueprint
fn apply_overrides(blueprint: &mut PipelineBlueprint, model: &ModelArgs, output: &OutputArgs) {
    if let Some(provider) = model.provider {
        blueprint.model.provider = provider.into();
    }
    if let Some(ref name) = model.model {
        blueprint.model.model = Some(name.clone());
    }
    if let Some(attempts) = model.max_attempts {
        blueprint.retry.max_attempts = attempts;
    }

    let output_dir = output.output_dir.to_string_lossy().to_string();
    blueprint.sinks.clear();
    for format in &output.formats {
        if blueprint.sinks.iter().all(|s| s.sink_type != *format) {
            blueprint
                .sinks
                .push(SinkConfig::new(*format).with_output_dir(&output_dir));
        }
    }

    info!(
        provider = %blueprint.model.provider,
        model = blueprint.model.model_name(),
        formats = ?output.formats,
        output_dir = %output_dir,
        "Pipeline options resolved"
    );
}
