use crate::models::ProviderType;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Closed set of failure classes every adapter maps vendor errors into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidApiKey,
    Unauthorized,
    InvalidParameters,
    PromptTooLong,
    UnsupportedAspectRatio,
    QuotaExceeded,
    RateLimited,
    ServiceUnavailable,
    Timeout,
    NetworkError,
    GenerationFailed,
    UnknownError,
    /// The caller's cancellation token fired before a result was produced.
    Cancelled,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidApiKey => "INVALID_API_KEY",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::InvalidParameters => "INVALID_PARAMETERS",
            ErrorCode::PromptTooLong => "PROMPT_TOO_LONG",
            ErrorCode::UnsupportedAspectRatio => "UNSUPPORTED_ASPECT_RATIO",
            ErrorCode::QuotaExceeded => "QUOTA_EXCEEDED",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::GenerationFailed => "GENERATION_FAILED",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
            ErrorCode::Cancelled => "CANCELLED",
        }
    }

    /// Whether a fresh error of this class is transient by default.
    pub fn default_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::QuotaExceeded
                | ErrorCode::RateLimited
                | ErrorCode::ServiceUnavailable
                | ErrorCode::Timeout
                | ErrorCode::NetworkError
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The only error type that crosses an adapter boundary.
#[derive(Debug, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct GenerationError {
    pub message: String,
    pub code: ErrorCode,
    pub provider: Option<ProviderType>,
    pub retryable: bool,
    #[source]
    pub source: Option<BoxError>,
}

impl GenerationError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
            provider: None,
            retryable: code.default_retryable(),
            source: None,
        }
    }

    pub fn with_provider(mut self, provider: ProviderType) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        self.source = Some(source.into());
        self
    }

    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParameters, message)
    }

    pub fn prompt_too_long(length: usize, max: usize) -> Self {
        Self::new(
            ErrorCode::PromptTooLong,
            format!("Prompt is {} characters, maximum is {}", length, max),
        )
    }

    pub fn unsupported_aspect_ratio(ratio: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::UnsupportedAspectRatio,
            format!("Aspect ratio {} is not supported", ratio),
        )
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "Image generation was cancelled")
    }

    /// Catch-all that always keeps the underlying cause.
    pub fn unknown<E>(source: E) -> Self
    where
        E: Into<BoxError>,
    {
        let source = source.into();
        Self::new(ErrorCode::UnknownError, source.to_string()).with_source(source)
    }
}

/// Problems with provider configuration, as opposed to a failed generation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Provider {0} is not configured")]
    NotConfigured(ProviderType),
    #[error("Provider {0} is not enabled")]
    NotEnabled(ProviderType),
    #[error("Provider {0} has no API key")]
    MissingApiKey(ProviderType),
    #[error("Provider {0} has no base URL")]
    MissingBaseUrl(ProviderType),
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

impl From<ConfigError> for GenerationError {
    fn from(err: ConfigError) -> Self {
        let code = match &err {
            ConfigError::MissingApiKey(_) => ErrorCode::InvalidApiKey,
            ConfigError::NotConfigured(_) | ConfigError::NotEnabled(_) => {
                ErrorCode::ServiceUnavailable
            }
            _ => ErrorCode::UnknownError,
        };
        let provider = match &err {
            ConfigError::NotConfigured(p)
            | ConfigError::NotEnabled(p)
            | ConfigError::MissingApiKey(p)
            | ConfigError::MissingBaseUrl(p) => Some(*p),
            _ => None,
        };
        let mut out = GenerationError::new(code, err.to_string())
            .with_retryable(false)
            .with_source(err);
        out.provider = provider;
        out
    }
}

pub type Result<T> = std::result::Result<T, GenerationError>;
