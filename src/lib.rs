//! Text-to-image provider layer for event flyers.
//!
//! One [`ImageProvider`] trait fronts Ideogram, Hugging Face, Qwen and two
//! Fal.ai models. [`ImageProviderFactory`] wires them together with a
//! circuit breaker, same-provider retry with backoff, and ordered
//! cross-provider fallback.
//!
//! ```no_run
//! use flyergen::{AspectRatio, GenerationRequest, ImageProviderFactory, QualityTier};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = ImageProviderFactory::from_env()?;
//! let request = GenerationRequest::new("Summer jazz night at the pier, bold retro poster")
//!     .with_aspect_ratio(AspectRatio::Portrait4x5)
//!     .with_quality(QualityTier::High);
//! let result = factory.generate_image(&request, None).await?;
//! std::fs::write(format!("flyer.{}", result.file_extension()), &result.image_data)?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod factory;
pub mod fallback;
pub mod logger;
pub mod models;
pub mod providers;
pub mod registry;
pub mod retry;

#[cfg(test)]
mod test_support;

pub use circuit_breaker::{CircuitBreaker, CircuitStatus};
pub use config::{
    CircuitBreakerConfig, EnvSource, FallbackConfig, MapEnv, ProcessEnv, ProviderConfig,
    RetryConfig, Settings,
};
pub use error::{ConfigError, ErrorCode, GenerationError, Result};
pub use factory::{ImageProviderFactory, ProviderHealth, ProviderSummary, SetupValidation};
pub use fallback::FallbackOrchestrator;
pub use models::*;
pub use providers::{ImageProvider, VendorParams};
pub use registry::{ConfigValidation, ProviderRegistry, RegistrySnapshot};
pub use retry::RetryEngine;

pub use tokio_util::sync::CancellationToken;
