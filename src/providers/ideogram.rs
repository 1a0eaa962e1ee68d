use crate::{
    config::ProviderConfig,
    error::{GenerationError, Result},
    models::{
        AspectRatio, GenerationRequest, GenerationResult, Pricing, ProviderCapabilities,
        ProviderType, QualityTier, RateLimits,
    },
    providers::{
        compensated_quality, dimensions, finish_result, http, log_quality_upgrade,
        requested_quality, resolve_seed, Generated, ImageProvider, VendorParams,
    },
};
use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;

const PROVIDER: ProviderType = ProviderType::Ideogram;

#[derive(Debug, Deserialize)]
struct IdeogramResponse {
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    data: Vec<IdeogramImage>,
}

#[derive(Debug, Deserialize)]
struct IdeogramImage {
    url: Option<String>,
    seed: Option<u64>,
    resolution: Option<String>,
    is_image_safe: Option<bool>,
    prompt: Option<String>,
    style_type: Option<String>,
}

/// Ideogram's own output resolution for each ratio it accepts.
fn native_resolution(ratio: AspectRatio) -> Option<(u32, u32)> {
    match ratio {
        AspectRatio::Square => Some((1024, 1024)),
        AspectRatio::Landscape16x9 => Some((1312, 736)),
        AspectRatio::Portrait9x16 => Some((736, 1312)),
        AspectRatio::Landscape4x3 => Some((1152, 864)),
        AspectRatio::Portrait3x4 => Some((864, 1152)),
        AspectRatio::Portrait4x5 => Some((896, 1120)),
        AspectRatio::Landscape3x2 => Some((1248, 832)),
        AspectRatio::Portrait2x3 => Some((832, 1248)),
        AspectRatio::Portrait10x16 => Some((800, 1280)),
        AspectRatio::Landscape16x10 => Some((1280, 800)),
        AspectRatio::Portrait1x3 => Some((576, 1728)),
        AspectRatio::Landscape3x1 => Some((1728, 576)),
        AspectRatio::Portrait5x7 => None,
    }
}

/// `16:9` becomes `16x9`.
pub(crate) fn aspect_token(ratio: AspectRatio) -> String {
    ratio.as_str().replace(':', "x")
}

pub(crate) fn style_type(request: &GenerationRequest) -> &'static str {
    let raw = request
        .option_str("style_type")
        .or(request.style.as_deref())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match raw.as_str() {
        "general" => "GENERAL",
        "realistic" | "photo" | "photographic" => "REALISTIC",
        "design" | "flyer" | "poster" | "graphic" => "DESIGN",
        "fiction" => "FICTION",
        _ => "AUTO",
    }
}

/// Ideogram and its Fal.ai mirror share the same capability surface.
pub(crate) fn ideogram_capabilities(supports_style_images: bool) -> ProviderCapabilities {
    ProviderCapabilities {
        supported_aspect_ratios: AspectRatio::ALL
            .into_iter()
            .filter(|r| native_resolution(*r).is_some())
            .collect(),
        supported_qualities: QualityTier::ALL.to_vec(),
        max_prompt_length: 4000,
        supports_seed: true,
        supports_style_images,
        supports_editing: supports_style_images,
        rate_limits: RateLimits {
            per_minute: Some(10),
            per_hour: None,
            per_day: None,
        },
        pricing: Pricing::flat(0.06)
            .with_tier_cost(QualityTier::Fast, 0.03)
            .with_tier_cost(QualityTier::Standard, 0.06)
            .with_tier_cost(QualityTier::High, 0.09)
            .with_tier_cost(QualityTier::Ultra, 0.09),
    }
}

fn parse_resolution(raw: &str) -> Option<(u32, u32)> {
    let (w, h) = raw.split_once('x')?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

pub struct IdeogramProvider {
    config: ProviderConfig,
    client: Client,
    api_key: String,
    capabilities: ProviderCapabilities,
}

impl IdeogramProvider {
    pub fn new(config: ProviderConfig, client: Client) -> Self {
        let api_key = config.api_key.clone().unwrap_or_default();
        Self {
            config,
            client,
            api_key,
            capabilities: ideogram_capabilities(true),
        }
    }

    fn rendering_speed(quality: QualityTier) -> &'static str {
        match quality {
            QualityTier::Fast => "TURBO",
            QualityTier::Standard => "DEFAULT",
            QualityTier::High | QualityTier::Ultra => "QUALITY",
        }
    }

    fn build_form(
        &self,
        request: &GenerationRequest,
        params: &VendorParams,
        seed: Option<u64>,
    ) -> Result<Form> {
        let mut form = Form::new()
            .text("prompt", request.prompt.clone())
            .text("aspect_ratio", params.size_token.clone().unwrap_or_default())
            .text("rendering_speed", params.speed.unwrap_or("DEFAULT"))
            .text("style_type", style_type(request))
            .text(
                "magic_prompt",
                request
                    .option_str("magic_prompt")
                    .unwrap_or("AUTO")
                    .to_ascii_uppercase(),
            )
            .text("num_images", "1");

        if let Some(seed) = seed {
            form = form.text("seed", seed.to_string());
        }
        if let Some(negative) = &request.negative_prompt {
            form = form.text("negative_prompt", negative.clone());
        }
        for (index, image) in request.style_images.iter().enumerate() {
            let file_name = image
                .file_name
                .clone()
                .unwrap_or_else(|| format!("style-{}.png", index));
            let part = Part::bytes(image.data.clone())
                .file_name(file_name)
                .mime_str(&image.mime_type)
                .map_err(|e| {
                    GenerationError::invalid_parameters(format!(
                        "Invalid style image mime type {}: {}",
                        image.mime_type, e
                    ))
                    .with_provider(PROVIDER)
                })?;
            form = form.part("style_reference_images", part);
        }
        Ok(form)
    }
}

#[async_trait]
impl ImageProvider for IdeogramProvider {
    fn provider_type(&self) -> ProviderType {
        PROVIDER
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    fn optimized_params(&self, request: &GenerationRequest) -> VendorParams {
        let requested = requested_quality(&self.config, request);
        let effective = compensated_quality(request.aspect_ratio, requested);
        let (width, height) = native_resolution(request.aspect_ratio)
            .unwrap_or_else(|| dimensions::standard_dimensions(request.aspect_ratio));
        VendorParams {
            width,
            height,
            size_token: Some(aspect_token(request.aspect_ratio)),
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
        let form = self.build_form(request, &params, seed)?;
        let url = format!("{}/v1/ideogram-v3/generate", self.config.endpoint_base());

        log::info!(
            "🎨 Generating image with Ideogram ({} @ {})",
            request.aspect_ratio,
            params.speed.unwrap_or("DEFAULT")
        );

        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .timeout(self.config.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| http::transport_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(http::error_from_response(PROVIDER, response).await);
        }

        let body: IdeogramResponse = response
            .json()
            .await
            .map_err(|e| http::malformed(PROVIDER, e))?;
        let image = body
            .data
            .into_iter()
            .next()
            .ok_or_else(|| http::malformed(PROVIDER, "no images in response"))?;

        let Some(image_url) = image.url.clone() else {
            if image.is_image_safe == Some(false) {
                return Err(http::malformed(PROVIDER, "image was withheld by the safety filter"));
            }
            return Err(http::malformed(PROVIDER, "image has no URL"));
        };

        let fetched = http::fetch_image(&self.client, PROVIDER, &image_url, self.config.timeout)
            .await?;
        let (width, height) = image
            .resolution
            .as_deref()
            .and_then(parse_resolution)
            .unwrap_or((params.width, params.height));

        let provider_data = json!({
            "created": body.created,
            "url": image_url,
            "resolution": image.resolution,
            "rendering_speed": params.speed,
            "style_type": image.style_type,
            "magic_prompt": image.prompt,
        });

        Ok(finish_result(
            PROVIDER,
            request,
            &params,
            self.capabilities.pricing.cost_for(params.effective_quality),
            started,
            Generated {
                image: fetched,
                seed: image.seed.or(seed),
                width,
                height,
                provider_data,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> IdeogramProvider {
        IdeogramProvider::new(
            ProviderConfig::new(PROVIDER).with_api_key("key"),
            Client::new(),
        )
    }

    #[test]
    fn tokens_and_speeds() {
        let p = provider();
        let params = p.optimized_params(
            &GenerationRequest::new("x")
                .with_aspect_ratio(AspectRatio::Landscape16x10)
                .with_quality(QualityTier::High),
        );
        assert_eq!(params.size_token.as_deref(), Some("16x10"));
        assert_eq!(params.speed, Some("QUALITY"));
        assert_eq!((params.width, params.height), (1280, 800));
    }

    #[test]
    fn narrow_portrait_turbo_is_upgraded_and_priced_up() {
        let p = provider();
        let tall = GenerationRequest::new("x")
            .with_aspect_ratio(AspectRatio::Portrait9x16)
            .with_quality(QualityTier::Fast);
        let wide = tall.clone().with_aspect_ratio(AspectRatio::Landscape16x9);

        let params = p.optimized_params(&tall);
        assert!(params.quality_upgraded());
        assert_eq!(params.speed, Some("DEFAULT"));
        assert_eq!(p.estimate_cost(&tall), 0.06);
        assert_eq!(p.estimate_cost(&wide), 0.03);
    }

    #[test]
    fn five_by_seven_is_not_offered() {
        let p = provider();
        assert!(!p.capabilities().supports_aspect_ratio(AspectRatio::Portrait5x7));
        let request = GenerationRequest::new("x").with_aspect_ratio(AspectRatio::Portrait5x7);
        assert!(p.validate_params(&request).is_err());
    }

    #[test]
    fn style_type_mapping() {
        assert_eq!(style_type(&GenerationRequest::new("x").with_style("Flyer")), "DESIGN");
        assert_eq!(
            style_type(
                &GenerationRequest::new("x")
                    .with_style("design")
                    .with_option("style_type", json!("realistic"))
            ),
            "REALISTIC"
        );
        assert_eq!(style_type(&GenerationRequest::new("x")), "AUTO");
    }

    #[test]
    fn resolution_parsing() {
        assert_eq!(parse_resolution("1312x736"), Some((1312, 736)));
        assert_eq!(parse_resolution("wide"), None);
    }
}
