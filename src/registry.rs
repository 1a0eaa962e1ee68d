//! Provider registry: which backends are configured, enabled, and preferred.
//!
//! Readers take an `Arc<RegistrySnapshot>` and keep using it for the whole
//! request. Every mutation, including a full reload, builds a new snapshot
//! and swaps it in, so nobody ever observes a half-built configuration.

use crate::config::{EnvSource, ProcessEnv, ProviderConfig};
use crate::error::ConfigError;
use crate::models::ProviderType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

pub const DEFAULT_PROVIDER_VAR: &str = "DEFAULT_IMAGE_PROVIDER";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigValidation {
    pub valid: bool,
    pub error: Option<String>,
}

/// Immutable view of every configured provider.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    configs: Vec<ProviderConfig>,
    default_override: Option<ProviderType>,
}

impl RegistrySnapshot {
    fn from_env(env: &dyn EnvSource) -> Self {
        let configs: Vec<ProviderConfig> = ProviderType::ALL
            .iter()
            .filter_map(|provider| ProviderConfig::from_env(*provider, env))
            .collect();

        let default_override = env
            .var(DEFAULT_PROVIDER_VAR)
            .filter(|raw| !raw.trim().is_empty())
            .and_then(|raw| match raw.parse::<ProviderType>() {
                Ok(provider) => Some(provider),
                Err(e) => {
                    log::warn!("⚠️  {} ignored: {}", DEFAULT_PROVIDER_VAR, e);
                    None
                }
            });

        Self {
            configs,
            default_override,
        }
    }

    pub fn configs(&self) -> &[ProviderConfig] {
        &self.configs
    }

    pub fn config(&self, provider: ProviderType) -> Option<&ProviderConfig> {
        self.configs.iter().find(|c| c.provider == provider)
    }

    fn config_mut(&mut self, provider: ProviderType) -> Option<&mut ProviderConfig> {
        self.configs.iter_mut().find(|c| c.provider == provider)
    }

    pub fn is_usable(&self, provider: ProviderType) -> bool {
        self.config(provider)
            .map_or(false, |c| c.enabled && c.has_api_key())
    }

    /// Enabled providers, highest priority first. Ties keep declaration order.
    pub fn available_providers(&self) -> Vec<ProviderType> {
        let mut usable: Vec<&ProviderConfig> = self
            .configs
            .iter()
            .filter(|c| c.enabled && c.has_api_key())
            .collect();
        usable.sort_by(|a, b| b.priority.cmp(&a.priority));
        usable.into_iter().map(|c| c.provider).collect()
    }

    pub fn fallback_providers(&self, primary: ProviderType) -> Vec<ProviderType> {
        self.available_providers()
            .into_iter()
            .filter(|p| *p != primary)
            .collect()
    }

    pub fn default_provider(&self) -> Option<ProviderType> {
        if let Some(provider) = self.default_override {
            if self.is_usable(provider) {
                return Some(provider);
            }
            log::debug!(
                "Default provider override {} is not usable, using priority order",
                provider
            );
        }
        self.available_providers().into_iter().next()
    }

    fn insert(&mut self, config: ProviderConfig) {
        match self.config_mut(config.provider) {
            Some(existing) => *existing = config,
            None => {
                self.configs.push(config);
                self.configs
                    .sort_by_key(|c| c.provider.declaration_index());
            }
        }
    }
}

pub struct ProviderRegistry {
    env: Arc<dyn EnvSource>,
    state: RwLock<Arc<RegistrySnapshot>>,
}

impl ProviderRegistry {
    pub fn new(env: Arc<dyn EnvSource>) -> Self {
        let snapshot = RegistrySnapshot::from_env(env.as_ref());
        log::debug!(
            "Provider registry loaded {} configuration(s)",
            snapshot.configs.len()
        );
        Self {
            env,
            state: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn from_env() -> Self {
        Self::new(Arc::new(ProcessEnv))
    }

    /// Current configuration, stable for as long as the caller holds it.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        let guard = self.state.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    fn replace(&self, snapshot: RegistrySnapshot) {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(snapshot);
    }

    /// Copy-on-write edit of the live snapshot. A rejected edit leaves the
    /// current snapshot in place.
    fn update<F>(&self, edit: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut RegistrySnapshot) -> Result<(), ConfigError>,
    {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        let mut next = RegistrySnapshot::clone(&guard);
        edit(&mut next)?;
        *guard = Arc::new(next);
        Ok(())
    }

    fn modify<F>(&self, edit: F)
    where
        F: FnOnce(&mut RegistrySnapshot),
    {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        let mut next = RegistrySnapshot::clone(&guard);
        edit(&mut next);
        *guard = Arc::new(next);
    }

    pub fn get_provider_config(&self, provider: ProviderType) -> Option<ProviderConfig> {
        self.snapshot().config(provider).cloned()
    }

    pub fn get_default_provider(&self) -> Option<ProviderType> {
        self.snapshot().default_provider()
    }

    pub fn set_default_provider(&self, provider: ProviderType) -> Result<(), ConfigError> {
        self.update(|snapshot| {
            let config = snapshot
                .config(provider)
                .ok_or(ConfigError::NotConfigured(provider))?;
            if !config.enabled {
                return Err(ConfigError::NotEnabled(provider));
            }
            snapshot.default_override = Some(provider);
            Ok(())
        })?;
        log::info!("🎯 Default image provider set to {}", provider);
        Ok(())
    }

    pub fn get_available_providers(&self) -> Vec<ProviderType> {
        self.snapshot().available_providers()
    }

    pub fn get_fallback_providers(&self, primary: ProviderType) -> Vec<ProviderType> {
        self.snapshot().fallback_providers(primary)
    }

    /// Throws away all state, including runtime overrides, and re-reads the
    /// environment.
    pub fn reload_configurations(&self) {
        let snapshot = RegistrySnapshot::from_env(self.env.as_ref());
        log::info!(
            "🔄 Reloaded provider configurations: {} configured",
            snapshot.configs.len()
        );
        self.replace(snapshot);
    }

    pub fn validate_configurations(&self) -> BTreeMap<ProviderType, ConfigValidation> {
        self.snapshot()
            .configs()
            .iter()
            .map(|config| {
                let error = if !config.has_api_key() {
                    Some(ConfigError::MissingApiKey(config.provider).to_string())
                } else if !config.has_base_url() {
                    Some(ConfigError::MissingBaseUrl(config.provider).to_string())
                } else {
                    None
                };
                (
                    config.provider,
                    ConfigValidation {
                        valid: error.is_none(),
                        error,
                    },
                )
            })
            .collect()
    }

    pub fn enable_provider(&self, provider: ProviderType) -> Result<(), ConfigError> {
        self.update(|snapshot| {
            let config = snapshot
                .config_mut(provider)
                .ok_or(ConfigError::NotConfigured(provider))?;
            if !config.has_api_key() {
                return Err(ConfigError::MissingApiKey(provider));
            }
            config.enabled = true;
            Ok(())
        })
    }

    pub fn disable_provider(&self, provider: ProviderType) -> Result<(), ConfigError> {
        self.update(|snapshot| {
            let config = snapshot
                .config_mut(provider)
                .ok_or(ConfigError::NotConfigured(provider))?;
            config.enabled = false;
            Ok(())
        })
    }

    pub fn set_priority(&self, provider: ProviderType, priority: i32) -> Result<(), ConfigError> {
        self.update(|snapshot| {
            let config = snapshot
                .config_mut(provider)
                .ok_or(ConfigError::NotConfigured(provider))?;
            config.priority = priority;
            Ok(())
        })
    }

    /// Adds or replaces a configuration built in code rather than read from
    /// the environment. An enabled config without a key is stored disabled.
    pub fn register_config(&self, mut config: ProviderConfig) {
        if config.enabled && !config.has_api_key() {
            log::warn!(
                "⚠️  {} registered without an API key, leaving it disabled",
                config.provider
            );
            config.enabled = false;
        }
        self.modify(|snapshot| snapshot.insert(config));
    }
}
