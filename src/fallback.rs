//! Ordered, sequential fallback across providers.
//!
//! Each candidate gets the full retry budget before the next one is tried.
//! Providers are never called concurrently for the same request, since every
//! attempt is a billed generation.

use crate::{
    circuit_breaker::CircuitBreaker,
    config::{FallbackConfig, Settings},
    error::{ErrorCode, GenerationError, Result},
    models::{GenerationRequest, GenerationResult, ProviderType},
    providers::ImageProvider,
    registry::ProviderRegistry,
    retry::RetryEngine,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

pub type ProviderMap = HashMap<ProviderType, Arc<dyn ImageProvider>>;

pub struct FallbackOrchestrator {
    registry: Arc<ProviderRegistry>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryEngine,
    fallback: FallbackConfig,
    providers: RwLock<Arc<ProviderMap>>,
    last_errors: Mutex<HashMap<ProviderType, String>>,
}

impl FallbackOrchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        breaker: Arc<CircuitBreaker>,
        settings: &Settings,
    ) -> Self {
        Self {
            registry,
            breaker,
            retry: RetryEngine::new(settings.retry.clone()),
            fallback: settings.fallback.clone(),
            providers: RwLock::new(Arc::new(HashMap::new())),
            last_errors: Mutex::new(HashMap::new()),
        }
    }

    /// The live adapter set, stable for as long as the caller holds it.
    pub fn providers(&self) -> Arc<ProviderMap> {
        let guard = self.providers.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn provider(&self, provider: ProviderType) -> Option<Arc<dyn ImageProvider>> {
        self.providers().get(&provider).cloned()
    }

    pub fn is_registered(&self, provider: ProviderType) -> bool {
        self.providers().contains_key(&provider)
    }

    fn update_providers<F>(&self, edit: F)
    where
        F: FnOnce(&mut ProviderMap),
    {
        let mut guard = self.providers.write().unwrap_or_else(|e| e.into_inner());
        let mut next = ProviderMap::clone(&guard);
        edit(&mut next);
        *guard = Arc::new(next);
    }

    pub fn register_provider(&self, provider: Arc<dyn ImageProvider>) {
        let id = provider.provider_type();
        self.update_providers(|map| {
            map.insert(id, provider);
        });
        log::debug!("Registered {} with the fallback orchestrator", id);
    }

    pub fn unregister_provider(&self, provider: ProviderType) -> bool {
        let mut removed = false;
        self.update_providers(|map| {
            removed = map.remove(&provider).is_some();
        });
        removed
    }

    /// Swaps in a whole new adapter set at once.
    pub fn replace_providers(&self, providers: ProviderMap) {
        let mut guard = self.providers.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(providers);
    }

    pub fn last_error(&self, provider: ProviderType) -> Option<String> {
        let errors = self.last_errors.lock().unwrap_or_else(|e| e.into_inner());
        errors.get(&provider).cloned()
    }

    fn remember_error(&self, provider: ProviderType, error: &GenerationError) {
        let mut errors = self.last_errors.lock().unwrap_or_else(|e| e.into_inner());
        errors.insert(provider, error.to_string());
    }

    fn forget_error(&self, provider: ProviderType) {
        let mut errors = self.last_errors.lock().unwrap_or_else(|e| e.into_inner());
        errors.remove(&provider);
    }

    /// Candidate order: the preferred provider first when given, then every
    /// other available provider by priority.
    pub fn provider_order(&self, preferred: Option<ProviderType>) -> Vec<ProviderType> {
        let snapshot = self.registry.snapshot();
        match preferred {
            Some(first) => {
                let mut order = vec![first];
                order.extend(snapshot.fallback_providers(first));
                order
            }
            None => snapshot.available_providers(),
        }
    }

    pub async fn generate_image_with_fallback(
        &self,
        request: &GenerationRequest,
        preferred: Option<ProviderType>,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult> {
        let order = self.provider_order(preferred);
        let providers = self.providers();
        let mut last_error: Option<GenerationError> = None;

        log::debug!(
            "Provider order: {}",
            order
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(" → ")
        );

        for id in order {
            if cancel.is_cancelled() {
                return Err(GenerationError::cancelled());
            }

            if !self.breaker.is_provider_available(id) {
                log::warn!("⚡ Skipping {}: circuit open", id);
                continue;
            }

            let Some(provider) = providers.get(&id) else {
                log::warn!("⚠️  Skipping {}: no adapter registered", id);
                continue;
            };

            log::info!("🎯 Trying {}", id.display_name());
            match self
                .retry
                .generate_with_retry(provider.as_ref(), request, cancel)
                .await
            {
                Ok(result) => {
                    self.breaker.record_success(id);
                    self.forget_error(id);
                    return Ok(result);
                }
                Err(error) if error.code == ErrorCode::Cancelled => {
                    log::info!("🛑 Generation cancelled while using {}", id);
                    return Err(error);
                }
                Err(error) => {
                    self.breaker.record_failure(id);
                    self.remember_error(id, &error);

                    if self.fallback.aborts_on(error.code) {
                        log::error!("❌ {} failed with {}, not falling back", id, error);
                        return Err(error);
                    }
                    log::warn!("↪️  {} failed ({}), trying next provider", id, error);
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            GenerationError::new(ErrorCode::GenerationFailed, "All image providers failed")
                .with_retryable(false)
        }))
    }
}
