//! Image loading and preprocessing
//!
//! Sources are local files or http(s) URLs. Every image is converted to RGB,
//! downscaled to fit the configured box (aspect preserved), optionally
//! contrast-enhanced and sharpened, then re-encoded as PNG for the model.

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use contracts::{
    AnalysisRequest, ContractError, ImageInput, LoadedImage, LoadedImages, SkippedImage, Stage,
    StageConfig, StageContext, StageDescriptor, StageOutput,
};
use image::{DynamicImage, ImageFormat};
use tracing::{debug, info, instrument, warn};

const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif"];
const DEFAULT_MAX_DIMENSION: u32 = 1024;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
const CONTRAST: f32 = 10.0;
const SHARPEN_SIGMA: f32 = 0.8;
const SHARPEN_THRESHOLD: i32 = 2;

/// 预处理参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preprocess {
    pub max_width: u32,
    pub max_height: u32,
    pub enhance: bool,
}

impl Default for Preprocess {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_DIMENSION,
            max_height: DEFAULT_MAX_DIMENSION,
            enhance: true,
        }
    }
}

/// A pixel bound from params: absent falls back, zero or > u32::MAX is rejected
fn dimension_param(config: &StageConfig, key: &str, fallback: u32) -> Result<u32, ContractError> {
    let Some(raw) = config.params.get(key) else {
        return Ok(fallback);
    };
    raw.as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .filter(|v| *v > 0)
        .ok_or_else(|| {
            ContractError::config_validation(
                format!("stages.{}.params.{key}", config.name),
                format!("must be an integer between 1 and {}, got {raw}", u32::MAX),
            )
        })
}

pub struct LoadImagesStage {
    descriptor: StageDescriptor,
    preprocess: Preprocess,
    http: reqwest::Client,
}

impl LoadImagesStage {
    /// # Errors
    /// `ConfigValidation` for a zero or out-of-range size bound, `Other` when
    /// the HTTP client cannot be built.
    pub fn from_config(
        descriptor: StageDescriptor,
        config: &StageConfig,
    ) -> Result<Self, ContractError> {
        let max_dimension = dimension_param(config, "max_dimension", DEFAULT_MAX_DIMENSION)?;
        let preprocess = Preprocess {
            max_width: dimension_param(config, "max_width", max_dimension)?,
            max_height: dimension_param(config, "max_height", max_dimension)?,
            enhance: config.param_bool("enhance").unwrap_or(true),
        };
        let timeout = config
            .param_u64("fetch_timeout_secs")
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| ContractError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            descriptor,
            preprocess,
            http,
        })
    }

    async fn read_source(&self, source: &str) -> Result<Vec<u8>, String> {
        if is_url(source) {
            let response = self
                .http
                .get(source)
                .send()
                .await
                .map_err(|e| format!("download failed: {e}"))?;
            let status = response.status();
            if !status.is_success() {
                return Err(format!("download failed: HTTP {status}"));
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| format!("download failed: {e}"))?;
            return Ok(bytes.to_vec());
        }

        let path = Path::new(source);
        if !has_supported_extension(path) {
            return Err(format!(
                "unsupported file type (expected one of: {})",
                SUPPORTED_EXTENSIONS.join(", ")
            ));
        }
        tokio::fs::read(path)
            .await
            .map_err(|e| format!("read failed: {e}"))
    }

    async fn load_one(&self, source: &str) -> Result<LoadedImage, String> {
        let raw = self.read_source(source).await?;
        let preprocess = self.preprocess;
        let (width, height, png) =
            tokio::task::spawn_blocking(move || preprocess_image(&raw, preprocess))
                .await
                .map_err(|e| format!("decode task failed: {e}"))??;

        Ok(LoadedImage {
            source: source.to_string(),
            width,
            height,
            image: ImageInput::png(png),
        })
    }
}

#[async_trait]
impl Stage for LoadImagesStage {
    fn descriptor(&self) -> &StageDescriptor {
        &self.descriptor
    }

    #[instrument(name = "load_images", skip_all, fields(stage = %self.descriptor.name))]
    async fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutput, ContractError> {
        let stage = self.descriptor.name.as_str();
        let key = &self.descriptor.requires[0];
        let request: AnalysisRequest = ctx.state.get(stage, key)?;

        if request.image_sources.is_empty() {
            return Err(ContractError::stage_input(stage, key, "no image sources given"));
        }

        let mut loaded = LoadedImages::default();
        for source in &request.image_sources {
            match self.load_one(source).await {
                Ok(image) => {
                    debug!(source = %source, width = image.width, height = image.height, "image loaded");
                    loaded.images.push(image);
                }
                Err(reason) => {
                    warn!(source = %source, reason = %reason, "skipping image");
                    loaded.skipped.push(SkippedImage {
                        source: source.clone(),
                        reason,
                    });
                }
            }
        }

        if loaded.images.is_empty() {
            return Err(ContractError::stage_input(
                stage,
                key,
                format!(
                    "none of the {} image sources could be loaded",
                    request.image_sources.len()
                ),
            ));
        }

        info!(
            loaded = loaded.images.len(),
            skipped = loaded.skipped.len(),
            "images ready"
        );

        let mut output = StageOutput::typed(stage, &loaded)?;
        for skipped in &loaded.skipped {
            output = output.with_note(format!("skipped {}: {}", skipped.source, skipped.reason));
        }
        Ok(output)
    }
}

fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
}

/// Decode, normalize and re-encode one image
///
/// Returns the final dimensions and the PNG bytes.
pub fn preprocess_image(raw: &[u8], params: Preprocess) -> Result<(u32, u32, Vec<u8>), String> {
    let decoded = image::load_from_memory(raw).map_err(|e| format!("decode failed: {e}"))?;
    let mut img = DynamicImage::ImageRgb8(decoded.to_rgb8());

    if img.width() > params.max_width || img.height() > params.max_height {
        img = img.thumbnail(params.max_width, params.max_height);
    }
    if params.enhance {
        img = img
            .adjust_contrast(CONTRAST)
            .unsharpen(SHARPEN_SIGMA, SHARPEN_THRESHOLD);
    }

    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| format!("encode failed: {e}"))?;
    Ok((img.width(), img.height(), png))
}
