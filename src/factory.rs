//! The service object the rest of an application holds: owns the registry,
//! the circuit breaker, the live adapters and the fallback orchestrator.

use crate::{
    circuit_breaker::{CircuitBreaker, CircuitStatus},
    config::{provider_defaults, EnvSource, ProcessEnv, ProviderConfig, Settings},
    error::{ConfigError, Result},
    fallback::{FallbackOrchestrator, ProviderMap},
    logger::Timer,
    models::{GenerationRequest, GenerationResult, ProviderType},
    providers::{build_provider, ImageProvider},
    registry::ProviderRegistry,
};
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub available: bool,
    pub healthy: bool,
    pub circuit_open: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSummary {
    pub provider: ProviderType,
    pub enabled: bool,
    pub configured: bool,
    pub priority: i32,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SetupValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

pub struct ImageProviderFactory {
    registry: Arc<ProviderRegistry>,
    breaker: Arc<CircuitBreaker>,
    orchestrator: FallbackOrchestrator,
    client: Client,
}

impl ImageProviderFactory {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        settings: Settings,
    ) -> std::result::Result<Self, ConfigError> {
        let client = Client::builder()
            .user_agent(concat!("flyergen/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        let breaker = Arc::new(CircuitBreaker::new(settings.circuit_breaker.clone()));
        let orchestrator =
            FallbackOrchestrator::new(Arc::clone(&registry), Arc::clone(&breaker), &settings);

        let factory = Self {
            registry,
            breaker,
            orchestrator,
            client,
        };
        factory.load_providers();
        Ok(factory)
    }

    /// Registry and settings both read from `env`.
    pub fn with_env(env: Arc<dyn EnvSource>) -> std::result::Result<Self, ConfigError> {
        let settings = Settings::from_env(env.as_ref());
        Self::new(Arc::new(ProviderRegistry::new(env)), settings)
    }

    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Self::with_env(Arc::new(ProcessEnv))
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Instantiates one adapter per usable configuration and swaps the whole
    /// set into the orchestrator.
    fn load_providers(&self) {
        let snapshot = self.registry.snapshot();
        let mut providers = ProviderMap::new();

        for config in snapshot.configs() {
            if !config.enabled {
                log::debug!("Skipping disabled provider {}", config.provider);
                continue;
            }
            match build_provider(config.clone(), self.client.clone()) {
                Ok(adapter) => {
                    log::info!("✅ {} provider ready", config.provider.display_name());
                    providers.insert(config.provider, adapter);
                }
                Err(e) => log::warn!("⚠️  Could not initialize {}: {}", config.provider, e),
            }
        }

        if providers.is_empty() {
            log::warn!("⚠️  No image providers are configured");
        }
        self.orchestrator.replace_providers(providers);
    }

    /// Re-reads the environment and rebuilds every adapter. Runtime changes
    /// made through `add_provider` or the registry are discarded.
    pub fn reload(&self) {
        self.registry.reload_configurations();
        self.load_providers();
    }

    /// Brings up an adapter for every provider the current registry snapshot
    /// considers available but the live set lacks. Runtime registry changes
    /// stay in effect; only when an adapter still cannot be built does this
    /// fall back to a full reload from the environment. Returns whether the
    /// adapter set is complete afterwards.
    pub fn ensure_ready(&self) -> bool {
        let snapshot = self.registry.snapshot();
        let missing: Vec<ProviderType> = snapshot
            .available_providers()
            .into_iter()
            .filter(|p| !self.orchestrator.is_registered(*p))
            .collect();
        if missing.is_empty() {
            return true;
        }

        let mut complete = true;
        for provider in missing {
            let Some(config) = snapshot.config(provider) else {
                continue;
            };
            match build_provider(config.clone(), self.client.clone()) {
                Ok(adapter) => {
                    log::info!("🔄 {} provider brought up", provider.display_name());
                    self.orchestrator.register_provider(adapter);
                }
                Err(e) => {
                    log::warn!("⚠️  Could not initialize {}: {}", provider, e);
                    complete = false;
                }
            }
        }
        if complete {
            return true;
        }

        log::warn!("🔄 Live provider set still incomplete, reloading from environment");
        self.reload();
        self.registry
            .get_available_providers()
            .into_iter()
            .all(|p| self.orchestrator.is_registered(p))
    }

    pub fn get_provider(&self, provider: ProviderType) -> Option<Arc<dyn ImageProvider>> {
        if let Some(adapter) = self.orchestrator.provider(provider) {
            return Some(adapter);
        }
        if self.registry.snapshot().is_usable(provider) {
            self.ensure_ready();
            return self.orchestrator.provider(provider);
        }
        None
    }

    pub fn get_default_provider(&self) -> Option<Arc<dyn ImageProvider>> {
        self.registry
            .get_default_provider()
            .and_then(|p| self.get_provider(p))
    }

    pub async fn generate_image(
        &self,
        request: &GenerationRequest,
        preferred: Option<ProviderType>,
    ) -> Result<GenerationResult> {
        self.generate_image_with_cancel(request, preferred, &CancellationToken::new())
            .await
    }

    pub async fn generate_image_with_cancel(
        &self,
        request: &GenerationRequest,
        preferred: Option<ProviderType>,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult> {
        self.ensure_ready();
        let timer = Timer::new("image generation");
        let outcome = self
            .orchestrator
            .generate_image_with_fallback(request, preferred, cancel)
            .await;
        let elapsed = timer.finish();

        match &outcome {
            Ok(result) => log::info!(
                "🎉 Flyer generated by {} in {}ms (${:.4})",
                result.provider.display_name(),
                elapsed.as_millis(),
                result.cost
            ),
            Err(e) => log::error!("❌ Image generation failed: {}", e),
        }
        outcome
    }

    /// Providers with a live adapter, in fallback order.
    pub fn get_available_providers(&self) -> Vec<ProviderType> {
        self.registry
            .get_available_providers()
            .into_iter()
            .filter(|p| self.orchestrator.is_registered(*p))
            .collect()
    }

    /// Runs every adapter's health check concurrently. Each check is a real,
    /// billed generation.
    pub async fn get_providers_health(&self) -> BTreeMap<ProviderType, ProviderHealth> {
        let providers = self.orchestrator.providers();
        let snapshot = self.registry.snapshot();

        let checks = providers.iter().map(|(id, adapter)| {
            let id = *id;
            let adapter = Arc::clone(adapter);
            async move { (id, adapter.health_check().await) }
        });
        let results = join_all(checks).await;

        results
            .into_iter()
            .map(|(id, healthy)| {
                let circuit_open = self.breaker.status(id).open;
                (
                    id,
                    ProviderHealth {
                        available: snapshot.is_usable(id) && !circuit_open,
                        healthy,
                        circuit_open,
                        last_error: self.orchestrator.last_error(id),
                    },
                )
            })
            .collect()
    }

    pub fn get_circuit_status(&self) -> BTreeMap<ProviderType, CircuitStatus> {
        self.registry
            .snapshot()
            .configs()
            .iter()
            .map(|config| (config.provider, self.breaker.status(config.provider)))
            .collect()
    }

    /// One row per known provider, configured or not.
    pub fn get_provider_config_summary(&self) -> Vec<ProviderSummary> {
        let snapshot = self.registry.snapshot();
        let default = snapshot.default_provider();

        ProviderType::ALL
            .iter()
            .map(|provider| {
                let config = snapshot.config(*provider);
                ProviderSummary {
                    provider: *provider,
                    enabled: config.map_or(false, |c| c.enabled),
                    configured: config.map_or(false, ProviderConfig::has_api_key),
                    priority: config
                        .map_or(provider_defaults(*provider).priority, |c| c.priority),
                    is_default: default == Some(*provider),
                }
            })
            .collect()
    }

    /// Startup self-check. Only logs; never fails construction.
    pub fn validate_provider_setup(&self) -> SetupValidation {
        let mut errors: Vec<String> = self
            .registry
            .validate_configurations()
            .into_iter()
            .filter_map(|(provider, validation)| {
                validation
                    .error
                    .map(|error| format!("{}: {}", provider, error))
            })
            .collect();

        if self.get_available_providers().is_empty() {
            errors.push("No image providers are available".to_string());
        }

        let validation = SetupValidation {
            valid: errors.is_empty(),
            errors,
        };
        if validation.valid {
            log::info!("✅ Image provider setup is valid");
        } else {
            for error in &validation.errors {
                log::warn!("⚠️  Provider setup: {}", error);
            }
        }
        validation
    }

    /// Registers a configuration built in code and brings its adapter up.
    pub fn add_provider(&self, config: ProviderConfig) -> std::result::Result<(), ConfigError> {
        let provider = config.provider;
        let adapter = build_provider(config.clone(), self.client.clone())?;
        self.registry.register_config(config.with_enabled(true));
        self.breaker.reset(provider);
        self.orchestrator.register_provider(adapter);
        log::info!("➕ Added {} provider", provider.display_name());
        Ok(())
    }

    /// Takes a provider out of rotation until the next reload.
    pub fn remove_provider(&self, provider: ProviderType) -> bool {
        let removed = self.orchestrator.unregister_provider(provider);
        if let Err(e) = self.registry.disable_provider(provider) {
            log::debug!("Nothing to disable for {}: {}", provider, e);
        }
        self.breaker.reset(provider);
        if removed {
            log::info!("➖ Removed {} provider", provider.display_name());
        }
        removed
    }

    /// Cost of `request` on `provider`, or on the default provider.
    pub fn estimate_cost(
        &self,
        request: &GenerationRequest,
        provider: Option<ProviderType>,
    ) -> Option<f64> {
        let adapter = match provider {
            Some(id) => self.get_provider(id),
            None => self.get_default_provider(),
        }?;
        Some(adapter.estimate_cost(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapEnv;
    use crate::models::{AspectRatio, QualityTier};

    fn factory(pairs: &[(&str, &str)]) -> (Arc<MapEnv>, ImageProviderFactory) {
        let env = Arc::new(MapEnv::from_pairs(pairs.iter().copied()));
        let factory = ImageProviderFactory::with_env(env.clone()).unwrap();
        (env, factory)
    }

    #[test]
    fn builds_one_adapter_per_configured_provider() {
        let (_, factory) = factory(&[("IDEOGRAM_API_KEY", "ideo"), ("FAL_KEY", "fal")]);
        assert_eq!(
            factory.get_available_providers(),
            vec![
                ProviderType::Ideogram,
                ProviderType::FalIdeogram,
                ProviderType::FalQwen
            ]
        );
        assert!(factory.get_provider(ProviderType::HuggingFace).is_none());
        assert_eq!(
            factory.get_default_provider().unwrap().provider_type(),
            ProviderType::Ideogram
        );
    }

    #[test]
    fn disabled_provider_gets_no_adapter() {
        let (_, factory) = factory(&[("QWEN_API_KEY", "q"), ("QWEN_ENABLED", "false")]);
        assert!(factory.get_available_providers().is_empty());
        assert!(factory.get_provider(ProviderType::Qwen).is_none());
        assert!(!factory.validate_provider_setup().valid);
    }

    #[test]
    fn ensure_ready_keeps_runtime_registry_changes() {
        let (_, factory) = factory(&[
            ("IDEOGRAM_API_KEY", "ideo"),
            ("QWEN_API_KEY", "q"),
            ("QWEN_ENABLED", "false"),
        ]);
        assert_eq!(factory.get_available_providers(), vec![ProviderType::Ideogram]);

        let registry = factory.registry();
        registry.enable_provider(ProviderType::Qwen).unwrap();
        registry.set_priority(ProviderType::Ideogram, 1).unwrap();
        registry.set_default_provider(ProviderType::Ideogram).unwrap();

        assert!(factory.ensure_ready());
        assert_eq!(
            factory.get_available_providers(),
            vec![ProviderType::Qwen, ProviderType::Ideogram]
        );
        assert_eq!(
            registry
                .get_provider_config(ProviderType::Ideogram)
                .map(|c| c.priority),
            Some(1)
        );
        assert_eq!(registry.get_default_provider(), Some(ProviderType::Ideogram));
    }

    #[test]
    fn ensure_ready_picks_up_changed_environment() {
        let (env, factory) = factory(&[("IDEOGRAM_API_KEY", "ideo")]);
        env.set("HF_TOKEN", "hf");
        factory.registry().reload_configurations();
        assert!(factory.get_available_providers().len() == 1);

        assert!(factory.ensure_ready());
        assert!(factory.get_provider(ProviderType::HuggingFace).is_some());
    }

    #[test]
    fn summary_covers_every_provider() {
        let (_, factory) = factory(&[("HF_TOKEN", "hf"), ("DEFAULT_IMAGE_PROVIDER", "hf")]);
        let summary = factory.get_provider_config_summary();
        assert_eq!(summary.len(), ProviderType::ALL.len());

        let hf = summary
            .iter()
            .find(|s| s.provider == ProviderType::HuggingFace)
            .unwrap();
        assert!(hf.configured && hf.enabled && hf.is_default);

        let ideogram = summary
            .iter()
            .find(|s| s.provider == ProviderType::Ideogram)
            .unwrap();
        assert!(!ideogram.configured);
        assert_eq!(ideogram.priority, 100);
    }

    #[test]
    fn add_and_remove_at_runtime() {
        let (_, factory) = factory(&[]);
        assert!(factory.get_available_providers().is_empty());

        factory
            .add_provider(ProviderConfig::new(ProviderType::FalQwen).with_api_key("fal"))
            .unwrap();
        assert_eq!(factory.get_available_providers(), vec![ProviderType::FalQwen]);
        assert!(factory.validate_provider_setup().valid);

        assert!(factory.remove_provider(ProviderType::FalQwen));
        assert!(factory.get_available_providers().is_empty());
        assert!(factory.get_provider(ProviderType::FalQwen).is_none());
    }

    #[test]
    fn add_provider_without_key_is_rejected() {
        let (_, factory) = factory(&[]);
        let err = factory
            .add_provider(ProviderConfig::new(ProviderType::Ideogram))
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingApiKey(ProviderType::Ideogram));
    }

    #[test]
    fn estimate_cost_uses_default_or_named_provider() {
        let (_, factory) = factory(&[("IDEOGRAM_API_KEY", "ideo"), ("HF_TOKEN", "hf")]);
        let request = GenerationRequest::new("spring fair")
            .with_aspect_ratio(AspectRatio::Portrait9x16)
            .with_quality(QualityTier::Fast);

        // Ideogram bumps fast narrow portraits to standard pricing.
        assert_eq!(factory.estimate_cost(&request, None), Some(0.06));
        assert_eq!(
            factory.estimate_cost(&request, Some(ProviderType::HuggingFace)),
            Some(0.002)
        );
        assert_eq!(factory.estimate_cost(&request, Some(ProviderType::Qwen)), None);
    }

    #[test]
    fn circuit_status_lists_configured_providers() {
        let (_, factory) = factory(&[("FAL_KEY", "fal")]);
        factory
            .circuit_breaker()
            .record_failure(ProviderType::FalQwen);
        let status = factory.get_circuit_status();
        assert_eq!(status.len(), 2);
        assert_eq!(status[&ProviderType::FalQwen].failure_count, 1);
        assert!(!status[&ProviderType::FalIdeogram].open);
    }

    #[tokio::test]
    async fn generate_with_no_providers_fails_cleanly() {
        let (_, factory) = factory(&[]);
        let err = factory
            .generate_image(&GenerationRequest::new("x"), None)
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::GenerationFailed);
    }
}
