use crate::error::ErrorCode;
use crate::models::{ProviderType, QualityTier};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::env;
use std::sync::RwLock;
use std::time::Duration;

/// Where configuration values come from. Production reads the process
/// environment; tests hand in a map.
pub trait EnvSource: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

/// In-memory environment that can be edited between reloads.
#[derive(Debug, Default)]
pub struct MapEnv {
    vars: RwLock<HashMap<String, String>>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let vars = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            vars: RwLock::new(vars),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut vars) = self.vars.write() {
            vars.insert(key.into(), value.into());
        }
    }

    pub fn remove(&self, key: &str) {
        if let Ok(mut vars) = self.vars.write() {
            vars.remove(key);
        }
    }
}

impl EnvSource for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.read().ok().and_then(|vars| vars.get(key).cloned())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_env<T: std::str::FromStr>(env: &dyn EnvSource, key: &str) -> Option<T> {
    let raw = non_empty(env.var(key))?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("⚠️  Ignoring unparseable {}={}", key, raw);
            None
        }
    }
}

/// Built-in defaults for one provider: which variables hold its key, where it
/// lives, and how much it is preferred.
#[derive(Debug, Clone, Copy)]
pub struct ProviderDefaults {
    pub key_vars: &'static [&'static str],
    pub base_url: &'static str,
    pub priority: i32,
    pub model: Option<&'static str>,
    pub timeout: Duration,
}

pub fn provider_defaults(provider: ProviderType) -> ProviderDefaults {
    match provider {
        ProviderType::Ideogram => ProviderDefaults {
            key_vars: &["IDEOGRAM_API_KEY"],
            base_url: "https://api.ideogram.ai",
            priority: 100,
            model: None,
            timeout: Duration::from_secs(90),
        },
        ProviderType::HuggingFace => ProviderDefaults {
            key_vars: &["HUGGINGFACE_API_KEY", "HF_TOKEN"],
            base_url: "https://api-inference.huggingface.co",
            priority: 60,
            model: Some("black-forest-labs/FLUX.1-schnell"),
            timeout: Duration::from_secs(120),
        },
        ProviderType::Qwen => ProviderDefaults {
            key_vars: &["QWEN_API_KEY"],
            base_url: "https://router.huggingface.co/hf-inference",
            priority: 70,
            model: Some("Qwen/Qwen-Image"),
            timeout: Duration::from_secs(180),
        },
        ProviderType::FalQwen => ProviderDefaults {
            key_vars: &["FAL_KEY"],
            base_url: "https://fal.run",
            priority: 80,
            model: Some("fal-ai/qwen-image"),
            timeout: Duration::from_secs(120),
        },
        ProviderType::FalIdeogram => ProviderDefaults {
            key_vars: &["FAL_KEY"],
            base_url: "https://fal.run",
            priority: 90,
            model: Some("fal-ai/ideogram/v3"),
            timeout: Duration::from_secs(120),
        },
    }
}

/// Credentials and operational knobs for one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: ProviderType,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub enabled: bool,
    pub priority: i32,
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    #[serde(default)]
    pub options: HashMap<String, Value>,
}

impl ProviderConfig {
    /// A config seeded with the provider's built-in defaults and no key.
    pub fn new(provider: ProviderType) -> Self {
        let defaults = provider_defaults(provider);
        let mut options = HashMap::new();
        if let Some(model) = defaults.model {
            options.insert("model".to_string(), Value::String(model.to_string()));
        }
        Self {
            provider,
            api_key: None,
            base_url: Some(defaults.base_url.to_string()),
            enabled: false,
            priority: defaults.priority,
            timeout: defaults.timeout,
            options,
        }
    }

    /// Reads one provider's settings. Returns `None` when no API key is
    /// present; a provider without credentials is never materialized.
    pub fn from_env(provider: ProviderType, env: &dyn EnvSource) -> Option<Self> {
        let defaults = provider_defaults(provider);
        let api_key = defaults
            .key_vars
            .iter()
            .find_map(|key| non_empty(env.var(key)))?;

        let prefix = provider.env_prefix();
        let mut config = Self::new(provider).with_api_key(api_key);

        if let Some(raw) = env.var(&format!("{}_BASE_URL", prefix)) {
            // An explicitly empty override is kept so validation can flag it.
            config.base_url = non_empty(Some(raw));
        }
        if let Some(priority) = parse_env::<i32>(env, &format!("{}_PRIORITY", prefix)) {
            config.priority = priority;
        }
        if let Some(ms) = parse_env::<u64>(env, &format!("{}_TIMEOUT_MS", prefix)) {
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(model) = non_empty(env.var(&format!("{}_MODEL", prefix))) {
            config = config.with_option("model", Value::String(model));
        }
        if let Some(quality) = parse_env::<QualityTier>(env, &format!("{}_DEFAULT_QUALITY", prefix))
        {
            config = config.with_option("default_quality", Value::String(quality.to_string()));
        }
        config.enabled = env
            .var(&format!("{}_ENABLED", prefix))
            .and_then(|raw| parse_flag(&raw))
            .unwrap_or(true);

        Some(config)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self.enabled = true;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_deref()
            .map_or(false, |key| !key.trim().is_empty())
    }

    pub fn has_base_url(&self) -> bool {
        self.base_url
            .as_deref()
            .map_or(false, |url| !url.trim().is_empty())
    }

    pub fn model(&self) -> Option<&str> {
        self.options.get("model").and_then(Value::as_str)
    }

    pub fn default_quality(&self) -> Option<QualityTier> {
        self.options
            .get("default_quality")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse().ok())
    }

    /// Base URL without a trailing slash, falling back to the built-in default.
    pub fn endpoint_base(&self) -> String {
        self.base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(provider_defaults(self.provider).base_url)
            .trim_end_matches('/')
            .to_string()
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    pub retryable_codes: BTreeSet<ErrorCode>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(30_000),
            retryable_codes: [
                ErrorCode::QuotaExceeded,
                ErrorCode::RateLimited,
                ErrorCode::ServiceUnavailable,
                ErrorCode::Timeout,
                ErrorCode::NetworkError,
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl RetryConfig {
    pub fn from_env(env: &dyn EnvSource) -> Self {
        let mut config = Self::default();
        if let Some(attempts) = parse_env::<u32>(env, "IMAGE_RETRY_MAX_ATTEMPTS") {
            config.max_attempts = attempts.max(1);
        }
        if let Some(ms) = parse_env::<u64>(env, "IMAGE_RETRY_BASE_DELAY_MS") {
            config.base_delay = Duration::from_millis(ms);
        }
        if let Some(multiplier) = parse_env::<f64>(env, "IMAGE_RETRY_BACKOFF_MULTIPLIER") {
            config.backoff_multiplier = multiplier;
        }
        if let Some(ms) = parse_env::<u64>(env, "IMAGE_RETRY_MAX_DELAY_MS") {
            config.max_delay = Duration::from_millis(ms);
        }
        config
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_delays(mut self, base: Duration, multiplier: f64, max: Duration) -> Self {
        self.base_delay = base;
        self.backoff_multiplier = multiplier;
        self.max_delay = max;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_millis(60_000),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn from_env(env: &dyn EnvSource) -> Self {
        let mut config = Self::default();
        if let Some(threshold) = parse_env::<u32>(env, "IMAGE_CIRCUIT_FAILURE_THRESHOLD") {
            config.failure_threshold = threshold.max(1);
        }
        if let Some(ms) = parse_env::<u64>(env, "IMAGE_CIRCUIT_RESET_TIMEOUT_MS") {
            config.reset_timeout = Duration::from_millis(ms);
        }
        config
    }
}

/// Which error codes end the whole fallback chain instead of moving on.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackConfig {
    pub non_fallback_codes: BTreeSet<ErrorCode>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        // Unsupported ratios fall through to the next provider.
        Self {
            non_fallback_codes: [
                ErrorCode::InvalidParameters,
                ErrorCode::PromptTooLong,
                ErrorCode::InvalidApiKey,
                ErrorCode::Unauthorized,
                ErrorCode::Cancelled,
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl FallbackConfig {
    pub fn with_non_fallback_code(mut self, code: ErrorCode) -> Self {
        self.non_fallback_codes.insert(code);
        self
    }

    pub fn aborts_on(&self, code: ErrorCode) -> bool {
        self.non_fallback_codes.contains(&code)
    }
}

/// Everything the provider layer needs besides per-provider credentials.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub fallback: FallbackConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env(env: &dyn EnvSource) -> Self {
        Self {
            retry: RetryConfig::from_env(env),
            circuit_breaker: CircuitBreakerConfig::from_env(env),
            fallback: FallbackConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackConfig) -> Self {
        self.fallback = fallback;
        self
    }
}
