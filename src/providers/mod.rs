pub mod dimensions;
mod fal;
pub mod fal_ideogram;
pub mod fal_qwen;
pub mod http;
pub mod hugging_face;
pub mod ideogram;
pub mod qwen;

use crate::{
    config::ProviderConfig,
    error::{ConfigError, GenerationError, Result},
    models::{
        AspectRatio, GenerationRequest, GenerationResult, ImageMetadata, ProviderCapabilities,
        ProviderType, QualityTier,
    },
};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

pub use fal_ideogram::FalIdeogramProvider;
pub use fal_qwen::FalQwenProvider;
pub use http::FetchedImage;
pub use hugging_face::HuggingFaceProvider;
pub use ideogram::IdeogramProvider;
pub use qwen::QwenProvider;

/// Vendor knobs derived from a request. Always computed from fixed tables so
/// the same request maps to the same output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorParams {
    pub width: u32,
    pub height: u32,
    pub size_token: Option<String>,
    pub speed: Option<&'static str>,
    pub steps: Option<u32>,
    pub guidance_scale: Option<f64>,
    pub requested_quality: QualityTier,
    pub effective_quality: QualityTier,
}

impl VendorParams {
    pub fn quality_upgraded(&self) -> bool {
        self.effective_quality != self.requested_quality
    }
}

/// The contract every image backend implements. Callers above this layer
/// never branch on which vendor sits behind it.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn provider_type(&self) -> ProviderType;

    fn capabilities(&self) -> &ProviderCapabilities;

    fn validate_params(&self, request: &GenerationRequest) -> Result<()> {
        validate_against(self.provider_type(), self.capabilities(), request)
    }

    fn optimized_params(&self, request: &GenerationRequest) -> VendorParams;

    async fn generate_image(&self, request: &GenerationRequest) -> Result<GenerationResult>;

    /// Issues a tiny real generation. Never fails; any error reads as unhealthy.
    async fn health_check(&self) -> bool {
        let probe = GenerationRequest::new("test")
            .with_aspect_ratio(AspectRatio::Square)
            .with_quality(QualityTier::Fast);
        match self.generate_image(&probe).await {
            Ok(_) => true,
            Err(e) => {
                log::warn!("🩺 Health check failed for {}: {}", self.provider_type(), e);
                false
            }
        }
    }

    fn estimate_cost(&self, request: &GenerationRequest) -> f64 {
        let params = self.optimized_params(request);
        self.capabilities()
            .pricing
            .cost_for(params.effective_quality)
    }
}

/// Default request validation against declared capabilities.
pub fn validate_against(
    provider: ProviderType,
    capabilities: &ProviderCapabilities,
    request: &GenerationRequest,
) -> Result<()> {
    if request.prompt.trim().is_empty() {
        return Err(
            GenerationError::invalid_parameters("Prompt must not be empty").with_provider(provider),
        );
    }

    let length = request.prompt.chars().count();
    if length > capabilities.max_prompt_length {
        return Err(
            GenerationError::prompt_too_long(length, capabilities.max_prompt_length)
                .with_provider(provider),
        );
    }

    if !capabilities.supports_aspect_ratio(request.aspect_ratio) {
        return Err(
            GenerationError::unsupported_aspect_ratio(request.aspect_ratio).with_provider(provider),
        );
    }

    if let Some(quality) = request.quality {
        if !capabilities.supports_quality(quality) {
            return Err(GenerationError::invalid_parameters(format!(
                "Quality tier {} is not supported",
                quality
            ))
            .with_provider(provider));
        }
    }

    if request.seed.is_some() && !capabilities.supports_seed {
        return Err(
            GenerationError::invalid_parameters("This provider does not accept a seed")
                .with_provider(provider),
        );
    }

    if !request.style_images.is_empty() && !capabilities.supports_style_images {
        return Err(GenerationError::invalid_parameters(
            "This provider does not accept style reference images",
        )
        .with_provider(provider));
    }

    Ok(())
}

/// Request quality, else the provider's configured default, else standard.
pub fn requested_quality(config: &ProviderConfig, request: &GenerationRequest) -> QualityTier {
    request
        .quality
        .or_else(|| config.default_quality())
        .unwrap_or_default()
}

/// Narrow portrait ratios never render at the fastest tier; they are bumped
/// one tier and priced at the bumped tier.
pub fn compensated_quality(ratio: AspectRatio, quality: QualityTier) -> QualityTier {
    if ratio.is_narrow_portrait() && quality == QualityTier::Fast {
        quality.upgraded()
    } else {
        quality
    }
}

pub fn log_quality_upgrade(provider: ProviderType, ratio: AspectRatio, params: &VendorParams) {
    if params.quality_upgraded() {
        log::info!(
            "🔧 {}: upgrading {} to {} for {} output",
            provider,
            params.requested_quality,
            params.effective_quality,
            ratio
        );
    }
}

/// The seed to send: a fresh random one when asked for, else the caller's.
pub fn resolve_seed(request: &GenerationRequest) -> Option<u64> {
    if request.randomize_seed {
        // Must stay within i32::MAX for every vendor.
        Some((uuid::Uuid::new_v4().as_u128() as u64) & 0x7fff_ffff)
    } else {
        request.seed
    }
}

/// Everything an adapter learned from a successful vendor call.
pub(crate) struct Generated {
    pub image: FetchedImage,
    pub seed: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub provider_data: Value,
}

pub(crate) fn finish_result(
    provider: ProviderType,
    request: &GenerationRequest,
    params: &VendorParams,
    cost: f64,
    started: Instant,
    generated: Generated,
) -> GenerationResult {
    let generation_time = started.elapsed();
    log::info!(
        "🖼️  {} generated {}x{} {} in {}ms",
        provider,
        generated.width,
        generated.height,
        generated.image.mime_type,
        generation_time.as_millis()
    );
    GenerationResult {
        image_data: generated.image.bytes,
        mime_type: generated.image.mime_type,
        seed: generated.seed,
        provider,
        cost,
        generation_time,
        metadata: ImageMetadata {
            width: generated.width,
            height: generated.height,
            aspect_ratio: request.aspect_ratio,
            prompt: request.prompt.clone(),
            quality: params.effective_quality,
        },
        provider_data: generated.provider_data,
    }
}

/// Builds the adapter for one configured provider.
pub fn build_provider(
    config: ProviderConfig,
    client: reqwest::Client,
) -> std::result::Result<Arc<dyn ImageProvider>, ConfigError> {
    if !config.has_api_key() {
        return Err(ConfigError::MissingApiKey(config.provider));
    }
    let provider: Arc<dyn ImageProvider> = match config.provider {
        ProviderType::Ideogram => Arc::new(IdeogramProvider::new(config, client)),
        ProviderType::HuggingFace => Arc::new(HuggingFaceProvider::new(config, client)),
        ProviderType::Qwen => Arc::new(QwenProvider::new(config, client)),
        ProviderType::FalQwen => Arc::new(FalQwenProvider::new(config, client)),
        ProviderType::FalIdeogram => Arc::new(FalIdeogramProvider::new(config, client)),
    };
    Ok(provider)
}
