use crate::{
    config::ProviderConfig,
    error::Result,
    models::{
        AspectRatio, GenerationRequest, GenerationResult, Pricing, ProviderCapabilities,
        ProviderType, QualityTier, RateLimits,
    },
    providers::{
        dimensions, finish_result, hugging_face::run_inference, requested_quality,
        validate_against, Generated, ImageProvider, VendorParams,
    },
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Instant;

const PROVIDER: ProviderType = ProviderType::Qwen;

/// Qwen-Image through the Hugging Face inference router.
///
/// The route ignores seeds. A seeded request is accepted with a warning and
/// the seed is dropped.
pub struct QwenProvider {
    config: ProviderConfig,
    client: Client,
    api_key: String,
    capabilities: ProviderCapabilities,
}

impl QwenProvider {
    pub fn new(config: ProviderConfig, client: Client) -> Self {
        let api_key = config.api_key.clone().unwrap_or_default();
        let capabilities = ProviderCapabilities {
            supported_aspect_ratios: AspectRatio::ALL
                .into_iter()
                .filter(|r| !matches!(r, AspectRatio::Portrait1x3 | AspectRatio::Landscape3x1))
                .collect(),
            supported_qualities: QualityTier::ALL.to_vec(),
            max_prompt_length: 3000,
            supports_seed: false,
            supports_style_images: false,
            supports_editing: false,
            rate_limits: RateLimits::default(),
            pricing: Pricing::flat(0.02),
        };
        Self {
            config,
            client,
            api_key,
            capabilities,
        }
    }

    fn model(&self) -> &str {
        self.config.model().unwrap_or("Qwen/Qwen-Image")
    }

    fn steps(quality: QualityTier) -> u32 {
        match quality {
            QualityTier::Fast => 20,
            QualityTier::Standard => 30,
            QualityTier::High => 40,
            QualityTier::Ultra => 50,
        }
    }
}

#[async_trait]
impl ImageProvider for QwenProvider {
    fn provider_type(&self) -> ProviderType {
        PROVIDER
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    fn validate_params(&self, request: &GenerationRequest) -> Result<()> {
        if request.seed.is_none() {
            return validate_against(PROVIDER, &self.capabilities, request);
        }
        log::warn!("⚠️  Qwen inference does not support seeds, dropping seed");
        let mut unseeded = request.clone();
        unseeded.seed = None;
        validate_against(PROVIDER, &self.capabilities, &unseeded)
    }

    fn optimized_params(&self, request: &GenerationRequest) -> VendorParams {
        let quality = requested_quality(&self.config, request);
        let (width, height) = dimensions::standard_dimensions(request.aspect_ratio);
        VendorParams {
            width,
            height,
            size_token: None,
            speed: None,
            steps: Some(Self::steps(quality)),
            guidance_scale: Some(request.option_f64("guidance_scale").unwrap_or(4.0)),
            requested_quality: quality,
            effective_quality: quality,
        }
    }

    async fn generate_image(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        self.validate_params(request)?;
        let params = self.optimized_params(request);
        let started = Instant::now();
        let model = self.model();

        let image = run_inference(
            &self.client,
            PROVIDER,
            &self.config,
            &self.api_key,
            model,
            request,
            &params,
            None,
        )
        .await?;

        Ok(finish_result(
            PROVIDER,
            request,
            &params,
            self.capabilities.pricing.cost_for(params.effective_quality),
            started,
            Generated {
                image,
                seed: None,
                width: params.width,
                height: params.height,
                provider_data: json!({
                    "model": model,
                    "num_inference_steps": params.steps,
                    "seed_dropped": request.seed.is_some() || request.randomize_seed,
                }),
            },
        ))
    }
}
