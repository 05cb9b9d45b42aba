//! Shared fixtures for the end-to-end tests

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use contracts::{PipelineBlueprint, PipelineState, RetryPolicy};
use image::{Rgb, RgbImage};
use model_client::MockModelClient;
use orchestrator::{PipelineBuilder, PipelineOutcome};

/// Write a small gradient PNG and return its path
pub fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> String {
    let path = dir.join(name);
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 255) as u8, (y % 255) as u8, 200])
    });
    img.save(&path).unwrap();
    path.to_string_lossy().into_owned()
}

/// Retries without real waiting
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::fixed(max_attempts, Duration::from_millis(1))
}

/// Build the blueprint's stages around `client` and run them
pub async fn run_with(
    blueprint: &PipelineBlueprint,
    client: Arc<MockModelClient>,
    seed: PipelineState,
) -> orchestrator::Result<PipelineOutcome> {
    let stages = stages::build_stages(blueprint, client)?;
    let pipeline = PipelineBuilder::from_blueprint(blueprint, stages).build()?;
    pipeline.run("run-e2e", seed).await
}
