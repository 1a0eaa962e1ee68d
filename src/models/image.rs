use super::{AspectRatio, ProviderType, QualityTier};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// A reference image whose look the generated flyer should borrow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleImage {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    pub quality: Option<QualityTier>,
    pub seed: Option<u64>,
    #[serde(default)]
    pub randomize_seed: bool,
    #[serde(default)]
    pub user_id: String,
    pub style: Option<String>,
    pub event_context: Option<String>,
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub style_images: Vec<StyleImage>,
    /// Provider specific knobs, passed through untouched by the shared layers.
    #[serde(default)]
    pub options: HashMap<String, Value>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            aspect_ratio: AspectRatio::default(),
            quality: None,
            seed: None,
            randomize_seed: false,
            user_id: String::new(),
            style: None,
            event_context: None,
            negative_prompt: None,
            style_images: Vec::new(),
            options: HashMap::new(),
        }
    }

    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = ratio;
        self
    }

    pub fn with_quality(mut self, quality: QualityTier) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_random_seed(mut self) -> Self {
        self.randomize_seed = true;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    pub fn with_event_context(mut self, context: impl Into<String>) -> Self {
        self.event_context = Some(context.into());
        self
    }

    pub fn with_negative_prompt(mut self, negative: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative.into());
        self
    }

    pub fn with_style_image(mut self, image: StyleImage) -> Self {
        self.style_images.push(image);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    pub fn quality_or_default(&self) -> QualityTier {
        self.quality.unwrap_or_default()
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    pub fn option_bool(&self, key: &str) -> Option<bool> {
        self.options.get(key).and_then(Value::as_bool)
    }

    pub fn option_f64(&self, key: &str) -> Option<f64> {
        self.options.get(key).and_then(Value::as_f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: AspectRatio,
    pub prompt: String,
    pub quality: QualityTier,
}

/// A successfully generated image, normalized across vendors.
#[derive(Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub image_data: Vec<u8>,
    pub mime_type: String,
    pub seed: Option<u64>,
    pub provider: ProviderType,
    pub cost: f64,
    pub generation_time: Duration,
    pub metadata: ImageMetadata,
    pub provider_data: Value,
}

impl fmt::Debug for GenerationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationResult")
            .field("image_bytes", &self.image_data.len())
            .field("mime_type", &self.mime_type)
            .field("seed", &self.seed)
            .field("provider", &self.provider)
            .field("cost", &self.cost)
            .field("generation_time", &self.generation_time)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl GenerationResult {
    /// File extension matching the mime type, for callers that persist the bytes.
    pub fn file_extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "png",
        }
    }
}
