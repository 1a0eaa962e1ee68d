use crate::{
    config::ProviderConfig,
    error::Result,
    models::{
        AspectRatio, GenerationRequest, GenerationResult, Pricing, ProviderCapabilities,
        ProviderType, QualityTier, RateLimits,
    },
    providers::{
        dimensions, finish_result, http, requested_quality, resolve_seed, FetchedImage, Generated,
        ImageProvider, VendorParams,
    },
};
use async_trait::async_trait;
use reqwest::{header::ACCEPT, Client};
use serde_json::{json, Map, Value};
use std::time::Instant;

const PROVIDER: ProviderType = ProviderType::HuggingFace;

/// Text-to-image call in the Hugging Face inference wire format: JSON
/// `{inputs, parameters}` in, raw image bytes out. Also used for Qwen-Image,
/// which is served through the same router.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_inference(
    client: &Client,
    provider: ProviderType,
    config: &ProviderConfig,
    api_key: &str,
    model: &str,
    request: &GenerationRequest,
    params: &VendorParams,
    seed: Option<u64>,
) -> Result<FetchedImage> {
    let url = format!("{}/models/{}", config.endpoint_base(), model);

    let mut parameters = Map::new();
    parameters.insert("width".into(), json!(params.width));
    parameters.insert("height".into(), json!(params.height));
    if let Some(steps) = params.steps {
        parameters.insert("num_inference_steps".into(), json!(steps));
    }
    if let Some(guidance) = params.guidance_scale {
        parameters.insert("guidance_scale".into(), json!(guidance));
    }
    if let Some(seed) = seed {
        parameters.insert("seed".into(), json!(seed));
    }
    if let Some(negative) = &request.negative_prompt {
        parameters.insert("negative_prompt".into(), json!(negative));
    }
    let payload = json!({
        "inputs": request.prompt,
        "parameters": Value::Object(parameters),
    });

    log::info!(
        "🎨 Generating image with {} model {} ({}x{}, {} steps)",
        provider.display_name(),
        model,
        params.width,
        params.height,
        params.steps.unwrap_or_default()
    );
    log::debug!("Inference payload: {}", payload);

    let response = client
        .post(&url)
        .bearer_auth(api_key)
        .header(ACCEPT, "image/png")
        .timeout(config.timeout)
        .json(&payload)
        .send()
        .await
        .map_err(|e| http::transport_error(provider, e))?;

    if !response.status().is_success() {
        let err = http::error_from_response(provider, response).await;
        if err.message.to_ascii_lowercase().contains("currently loading") {
            log::warn!("⏳ {} model {} is still loading", provider, model);
        }
        return Err(err);
    }

    http::read_image_body(provider, response).await
}

pub struct HuggingFaceProvider {
    config: ProviderConfig,
    client: Client,
    api_key: String,
    capabilities: ProviderCapabilities,
}

impl HuggingFaceProvider {
    pub fn new(config: ProviderConfig, client: Client) -> Self {
        let api_key = config.api_key.clone().unwrap_or_default();
        let capabilities = ProviderCapabilities {
            supported_aspect_ratios: AspectRatio::ALL.to_vec(),
            supported_qualities: QualityTier::ALL.to_vec(),
            max_prompt_length: 2000,
            supports_seed: true,
            supports_style_images: false,
            supports_editing: false,
            rate_limits: RateLimits {
                per_minute: None,
                per_hour: Some(300),
                per_day: None,
            },
            pricing: Pricing::flat(0.002).with_free_quota(100),
        };
        Self {
            config,
            client,
            api_key,
            capabilities,
        }
    }

    fn model(&self) -> &str {
        self.config
            .model()
            .unwrap_or("black-forest-labs/FLUX.1-schnell")
    }

    fn steps(quality: QualityTier) -> u32 {
        match quality {
            QualityTier::Fast => 2,
            QualityTier::Standard => 4,
            QualityTier::High => 6,
            QualityTier::Ultra => 8,
        }
    }
}

#[async_trait]
impl ImageProvider for HuggingFaceProvider {
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
            guidance_scale: Some(request.option_f64("guidance_scale").unwrap_or(3.5)),
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

        let image = run_inference(
            &self.client,
            PROVIDER,
            &self.config,
            &self.api_key,
            model,
            request,
            &params,
            seed,
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
                seed,
                width: params.width,
                height: params.height,
                provider_data: json!({
                    "model": model,
                    "num_inference_steps": params.steps,
                    "guidance_scale": params.guidance_scale,
                }),
            },
        ))
    }
}
