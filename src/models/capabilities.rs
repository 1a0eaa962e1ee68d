use super::{AspectRatio, QualityTier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Vendor-published request ceilings. Informational only; nothing in this
/// crate throttles against them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimits {
    pub per_minute: Option<u32>,
    pub per_hour: Option<u32>,
    pub per_day: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub cost_per_image: f64,
    pub currency: String,
    pub free_quota: Option<u32>,
    /// Per-tier price overrides. Tiers missing here cost `cost_per_image`.
    #[serde(default)]
    pub tier_costs: BTreeMap<QualityTier, f64>,
}

impl Pricing {
    pub fn flat(cost_per_image: f64) -> Self {
        Self {
            cost_per_image,
            currency: "USD".to_string(),
            free_quota: None,
            tier_costs: BTreeMap::new(),
        }
    }

    pub fn with_tier_cost(mut self, tier: QualityTier, cost: f64) -> Self {
        self.tier_costs.insert(tier, cost);
        self
    }

    pub fn with_free_quota(mut self, images: u32) -> Self {
        self.free_quota = Some(images);
        self
    }

    pub fn cost_for(&self, tier: QualityTier) -> f64 {
        self.tier_costs
            .get(&tier)
            .copied()
            .unwrap_or(self.cost_per_image)
    }
}

/// Declarative limits of one backend, fixed for the lifetime of an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub supported_aspect_ratios: Vec<AspectRatio>,
    pub supported_qualities: Vec<QualityTier>,
    pub max_prompt_length: usize,
    pub supports_seed: bool,
    pub supports_style_images: bool,
    pub supports_editing: bool,
    pub rate_limits: RateLimits,
    pub pricing: Pricing,
}

impl ProviderCapabilities {
    pub fn supports_aspect_ratio(&self, ratio: AspectRatio) -> bool {
        self.supported_aspect_ratios.contains(&ratio)
    }

    pub fn supports_quality(&self, quality: QualityTier) -> bool {
        self.supported_qualities.contains(&quality)
    }
}
