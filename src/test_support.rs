//! In-process providers for unit tests of the retry and fallback layers.

use crate::{
    error::{ErrorCode, GenerationError, Result},
    models::{
        AspectRatio, GenerationRequest, GenerationResult, ImageMetadata, Pricing,
        ProviderCapabilities, ProviderType, QualityTier, RateLimits,
    },
    providers::{ImageProvider, VendorParams},
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Plays back a fixed list of outcomes, then keeps succeeding.
pub struct ScriptedProvider {
    provider: ProviderType,
    script: Mutex<VecDeque<Option<ErrorCode>>>,
    calls: AtomicUsize,
    capabilities: ProviderCapabilities,
}

impl ScriptedProvider {
    pub fn new(provider: ProviderType) -> Self {
        Self {
            provider,
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            capabilities: ProviderCapabilities {
                supported_aspect_ratios: AspectRatio::ALL.to_vec(),
                supported_qualities: QualityTier::ALL.to_vec(),
                max_prompt_length: 1000,
                supports_seed: true,
                supports_style_images: false,
                supports_editing: false,
                rate_limits: RateLimits::default(),
                pricing: Pricing::flat(0.01),
            },
        }
    }

    pub fn fail(self, code: ErrorCode) -> Self {
        self.script.lock().unwrap().push_back(Some(code));
        self
    }

    pub fn succeed(self) -> Self {
        self.script.lock().unwrap().push_back(None);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageProvider for ScriptedProvider {
    fn provider_type(&self) -> ProviderType {
        self.provider
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    fn optimized_params(&self, request: &GenerationRequest) -> VendorParams {
        let quality = request.quality_or_default();
        VendorParams {
            width: 64,
            height: 64,
            size_token: None,
            speed: None,
            steps: None,
            guidance_scale: None,
            requested_quality: quality,
            effective_quality: quality,
        }
    }

    async fn generate_image(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front().flatten();
        if let Some(code) = next {
            return Err(GenerationError::new(code, format!("scripted {}", code))
                .with_provider(self.provider));
        }
        Ok(GenerationResult {
            image_data: vec![0x89, b'P', b'N', b'G'],
            mime_type: "image/png".into(),
            seed: request.seed,
            provider: self.provider,
            cost: 0.01,
            generation_time: Duration::from_millis(1),
            metadata: ImageMetadata {
                width: 64,
                height: 64,
                aspect_ratio: request.aspect_ratio,
                prompt: request.prompt.clone(),
                quality: request.quality_or_default(),
            },
            provider_data: serde_json::Value::Null,
        })
    }
}
