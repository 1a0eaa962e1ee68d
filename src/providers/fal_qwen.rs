use crate::{
    config::ProviderConfig,
    error::Result,
    models::{
        AspectRatio, GenerationRequest, GenerationResult, Pricing, ProviderCapabilities,
        ProviderType, QualityTier, RateLimits,
    },
    providers::{
        dimensions, fal, finish_result, requested_quality, resolve_seed, Generated, ImageProvider,
        VendorParams,
    },
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Instant;

const PROVIDER: ProviderType = ProviderType::FalQwen;

pub struct FalQwenProvider {
    config: ProviderConfig,
    client: Client,
    api_key: String,
    capabilities: ProviderCapabilities,
}

impl FalQwenProvider {
    pub fn new(config: ProviderConfig, client: Client) -> Self {
        let api_key = config.api_key.clone().unwrap_or_default();
        let capabilities = ProviderCapabilities {
            supported_aspect_ratios: AspectRatio::ALL.to_vec(),
            supported_qualities: QualityTier::ALL.to_vec(),
            max_prompt_length: 4000,
            supports_seed: true,
            supports_style_images: false,
            supports_editing: false,
            rate_limits: RateLimits {
                per_minute: Some(60),
                per_hour: None,
                per_day: None,
            },
            // Billed per megapixel; every output is ~1.75 MP.
            pricing: Pricing::flat(0.035),
        };
        Self {
            config,
            client,
            api_key,
            capabilities,
        }
    }

    fn model(&self) -> &str {
        self.config.model().unwrap_or("fal-ai/qwen-image")
    }

    fn steps(quality: QualityTier) -> u32 {
        match quality {
            QualityTier::Fast => 15,
            QualityTier::Standard => 30,
            QualityTier::High => 40,
            QualityTier::Ultra => 50,
        }
    }

    fn payload(
        &self,
        request: &GenerationRequest,
        params: &VendorParams,
        seed: Option<u64>,
    ) -> Value {
        let mut payload = json!({
            "prompt": request.prompt,
            "image_size": { "width": params.width, "height": params.height },
            "num_inference_steps": params.steps,
            "guidance_scale": params.guidance_scale,
            "num_images": 1,
            "output_format": "png",
            "enable_safety_checker": true,
            "sync_mode": request.option_bool("sync_mode").unwrap_or(false),
        });
        if let Some(seed) = seed {
            payload["seed"] = json!(seed);
        }
        if let Some(negative) = &request.negative_prompt {
            payload["negative_prompt"] = json!(negative);
        }
        payload
    }
}

#[async_trait]
impl ImageProvider for FalQwenProvider {
    fn provider_type(&self) -> ProviderType {
        PROVIDER
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
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
            guidance_scale: Some(request.option_f64("guidance_scale").unwrap_or(2.5)),
            requested_quality: quality,
            effective_quality: quality,
        }
    }

    async fn generate_image(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        self.validate_params(request)?;
        let params = self.optimized_params(request);
        let started = Instant::now();
        let seed = resolve_seed(request);
        let model = self.model();

        log::info!(
            "🎨 Generating image with Fal.ai {} ({}x{})",
            model,
            params.width,
            params.height
        );
        let payload = self.payload(request, &params, seed);
        let output = fal::run(
            &self.client,
            PROVIDER,
            &self.config,
            &self.api_key,
            model,
            &payload,
        )
        .await?;

        Ok(finish_result(
            PROVIDER,
            request,
            &params,
            self.capabilities.pricing.cost_for(params.effective_quality),
            started,
            Generated {
                image: output.image,
                seed: output.response.seed.or(seed),
                width: output.width.unwrap_or(params.width),
                height: output.height.unwrap_or(params.height),
                provider_data: json!({
                    "model": model,
                    "timings": output.response.timings,
                    "prompt": output.response.prompt,
                    "has_nsfw_concepts": output.response.has_nsfw_concepts,
                }),
            },
        ))
    }
}
