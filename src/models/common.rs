use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every image backend this crate knows how to talk to.
///
/// Declaration order is significant: it is the tie-breaker when two
/// providers share a priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderType {
    #[serde(rename = "ideogram")]
    Ideogram,
    #[serde(rename = "huggingface")]
    HuggingFace,
    #[serde(rename = "qwen")]
    Qwen,
    #[serde(rename = "fal-qwen")]
    FalQwen,
    #[serde(rename = "fal-ideogram")]
    FalIdeogram,
}

impl ProviderType {
    pub const ALL: [ProviderType; 5] = [
        ProviderType::Ideogram,
        ProviderType::HuggingFace,
        ProviderType::Qwen,
        ProviderType::FalQwen,
        ProviderType::FalIdeogram,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Ideogram => "ideogram",
            ProviderType::HuggingFace => "huggingface",
            ProviderType::Qwen => "qwen",
            ProviderType::FalQwen => "fal-qwen",
            ProviderType::FalIdeogram => "fal-ideogram",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderType::Ideogram => "Ideogram",
            ProviderType::HuggingFace => "Hugging Face Inference",
            ProviderType::Qwen => "Qwen Inference",
            ProviderType::FalQwen => "Fal.ai Qwen-Image",
            ProviderType::FalIdeogram => "Fal.ai Ideogram",
        }
    }

    /// Prefix of the per-provider override variables (`<PREFIX>_BASE_URL`, ...).
    pub fn env_prefix(&self) -> &'static str {
        match self {
            ProviderType::Ideogram => "IDEOGRAM",
            ProviderType::HuggingFace => "HUGGINGFACE",
            ProviderType::Qwen => "QWEN",
            ProviderType::FalQwen => "FAL_QWEN",
            ProviderType::FalIdeogram => "FAL_IDEOGRAM",
        }
    }

    pub fn declaration_index(&self) -> usize {
        Self::ALL.iter().position(|p| p == self).unwrap_or(usize::MAX)
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "ideogram" => Ok(ProviderType::Ideogram),
            "huggingface" | "hugging-face" | "hf" => Ok(ProviderType::HuggingFace),
            "qwen" => Ok(ProviderType::Qwen),
            "fal-qwen" | "falqwen" => Ok(ProviderType::FalQwen),
            "fal-ideogram" | "falideogram" => Ok(ProviderType::FalIdeogram),
            _ => Err(format!("unknown provider '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Landscape16x9,
    #[serde(rename = "9:16")]
    Portrait9x16,
    #[serde(rename = "4:3")]
    Landscape4x3,
    #[serde(rename = "3:4")]
    Portrait3x4,
    #[serde(rename = "4:5")]
    Portrait4x5,
    #[serde(rename = "5:7")]
    Portrait5x7,
    #[serde(rename = "3:2")]
    Landscape3x2,
    #[serde(rename = "2:3")]
    Portrait2x3,
    #[serde(rename = "10:16")]
    Portrait10x16,
    #[serde(rename = "16:10")]
    Landscape16x10,
    #[serde(rename = "1:3")]
    Portrait1x3,
    #[serde(rename = "3:1")]
    Landscape3x1,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 13] = [
        AspectRatio::Square,
        AspectRatio::Landscape16x9,
        AspectRatio::Portrait9x16,
        AspectRatio::Landscape4x3,
        AspectRatio::Portrait3x4,
        AspectRatio::Portrait4x5,
        AspectRatio::Portrait5x7,
        AspectRatio::Landscape3x2,
        AspectRatio::Portrait2x3,
        AspectRatio::Portrait10x16,
        AspectRatio::Landscape16x10,
        AspectRatio::Portrait1x3,
        AspectRatio::Landscape3x1,
    ];

    /// `(width, height)` ratio terms.
    pub fn terms(&self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (1, 1),
            AspectRatio::Landscape16x9 => (16, 9),
            AspectRatio::Portrait9x16 => (9, 16),
            AspectRatio::Landscape4x3 => (4, 3),
            AspectRatio::Portrait3x4 => (3, 4),
            AspectRatio::Portrait4x5 => (4, 5),
            AspectRatio::Portrait5x7 => (5, 7),
            AspectRatio::Landscape3x2 => (3, 2),
            AspectRatio::Portrait2x3 => (2, 3),
            AspectRatio::Portrait10x16 => (10, 16),
            AspectRatio::Landscape16x10 => (16, 10),
            AspectRatio::Portrait1x3 => (1, 3),
            AspectRatio::Landscape3x1 => (3, 1),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape16x9 => "16:9",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Portrait4x5 => "4:5",
            AspectRatio::Portrait5x7 => "5:7",
            AspectRatio::Landscape3x2 => "3:2",
            AspectRatio::Portrait2x3 => "2:3",
            AspectRatio::Portrait10x16 => "10:16",
            AspectRatio::Landscape16x10 => "16:10",
            AspectRatio::Portrait1x3 => "1:3",
            AspectRatio::Landscape3x1 => "3:1",
        }
    }

    /// Tall ratios that render noticeably softer at the fastest speed tiers.
    pub fn is_narrow_portrait(&self) -> bool {
        matches!(
            self,
            AspectRatio::Portrait9x16
                | AspectRatio::Portrait10x16
                | AspectRatio::Portrait2x3
                | AspectRatio::Portrait1x3
                | AspectRatio::Portrait5x7
        )
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        AspectRatio::Square
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace(['x', 'X'], ":");
        AspectRatio::ALL
            .iter()
            .copied()
            .find(|ratio| ratio.as_str() == normalized)
            .ok_or_else(|| format!("unknown aspect ratio '{}'", s))
    }
}

/// Caller-facing speed/fidelity trade-off, ordered from cheapest to best.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Fast,
    #[default]
    Standard,
    High,
    Ultra,
}

impl QualityTier {
    pub const ALL: [QualityTier; 4] = [
        QualityTier::Fast,
        QualityTier::Standard,
        QualityTier::High,
        QualityTier::Ultra,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Fast => "fast",
            QualityTier::Standard => "standard",
            QualityTier::High => "high",
            QualityTier::Ultra => "ultra",
        }
    }

    /// One tier up, saturating at `Ultra`.
    pub fn upgraded(&self) -> Self {
        match self {
            QualityTier::Fast => QualityTier::Standard,
            QualityTier::Standard => QualityTier::High,
            QualityTier::High | QualityTier::Ultra => QualityTier::Ultra,
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" | "turbo" => Ok(QualityTier::Fast),
            "standard" | "default" | "balanced" => Ok(QualityTier::Standard),
            "high" | "quality" => Ok(QualityTier::High),
            "ultra" => Ok(QualityTier::Ultra),
            _ => Err(format!("unknown quality tier '{}'", s)),
        }
    }
}
