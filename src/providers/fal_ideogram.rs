use crate::{
    config::ProviderConfig,
    error::Result,
    models::{
        AspectRatio, GenerationRequest, GenerationResult, ProviderCapabilities, ProviderType,
        QualityTier,
    },
    providers::{
        compensated_quality, dimensions, fal, finish_result,
        ideogram::{ideogram_capabilities, style_type},
        log_quality_upgrade, requested_quality, resolve_seed, Generated, ImageProvider,
        VendorParams,
    },
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Instant;

const PROVIDER: ProviderType = ProviderType::FalIdeogram;

/// Ideogram v3 hosted on Fal.ai. Same model family as the direct adapter,
/// but sized with explicit pixel dimensions and Fal's speed names.
pub struct FalIdeogramProvider {
    config: ProviderConfig,
    client: Client,
    api_key: String,
    capabilities: ProviderCapabilities,
}

impl FalIdeogramProvider {
    pub fn new(config: ProviderConfig, client: Client) -> Self {
        let api_key = config.api_key.clone().unwrap_or_default();
        // Explicit pixel sizes cover every ratio, not only Ideogram's native tokens.
        let mut capabilities = ideogram_capabilities(false);
        capabilities.supported_aspect_ratios = AspectRatio::ALL.to_vec();
        Self {
            config,
            client,
            api_key,
            capabilities,
        }
    }

    fn model(&self) -> &str {
        self.config.model().unwrap_or("fal-ai/ideogram/v3")
    }

    fn rendering_speed(quality: QualityTier) -> &'static str {
        match quality {
            QualityTier::Fast => "TURBO",
            QualityTier::Standard => "BALANCED",
            QualityTier::High | QualityTier::Ultra => "QUALITY",
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
            "rendering_speed": params.speed,
            "style": style_type(request),
            "expand_prompt": request.option_bool("magic_prompt").unwrap_or(true),
            "num_images": 1,
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
impl ImageProvider for FalIdeogramProvider {
    fn provider_type(&self) -> ProviderType {
        PROVIDER
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    fn optimized_params(&self, request: &GenerationRequest) -> VendorParams {
        let requested = requested_quality(&self.config, request);
        let effective = compensated_quality(request.aspect_ratio, requested);
        let (width, height) = dimensions::standard_dimensions(request.aspect_ratio);
        VendorParams {
            width,
            height,
            size_token: None,
            speed: Some(Self::rendering_speed(effective)),
            steps: None,
            guidance_scale: None,
            requested_quality: requested,
            effective_quality: effective,
        }
    }

    async fn generate_image(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        self.validate_params(request)?;
        let params = self.optimized_params(request);
        log_quality_upgrade(PROVIDER, request.aspect_ratio, &params);

        let started = Instant::now();
        let seed = resolve_seed(request);
        let model = self.model();

        log::info!(
            "🎨 Generating image with Fal.ai {} ({} @ {})",
            model,
            request.aspect_ratio,
            params.speed.unwrap_or("BALANCED")
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
                    "rendering_speed": params.speed,
                    "timings": output.response.timings,
                    "prompt": output.response.prompt,
                }),
            },
        ))
    }
}
