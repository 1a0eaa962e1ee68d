use crate::{
    config::RetryConfig,
    error::{GenerationError, Result},
    models::{GenerationRequest, GenerationResult},
    providers::ImageProvider,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Same-provider retry loop with capped exponential backoff.
#[derive(Debug, Clone, Default)]
pub struct RetryEngine {
    config: RetryConfig,
}

impl RetryEngine {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay before retry number `attempt` (1-based):
    /// `min(base * multiplier^(attempt - 1), max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let base_ms = self.config.base_delay.as_millis() as f64;
        let delay_ms = base_ms * self.config.backoff_multiplier.powi(exponent);
        let max_ms = self.config.max_delay.as_millis() as f64;
        Duration::from_millis(delay_ms.min(max_ms).max(0.0) as u64)
    }

    /// Both the error's own flag and the configured allowlist must agree.
    pub fn should_retry(&self, error: &GenerationError) -> bool {
        error.retryable && self.config.retryable_codes.contains(&error.code)
    }

    pub async fn generate_with_retry(
        &self,
        provider: &dyn ImageProvider,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(GenerationError::cancelled().with_provider(provider.provider_type()));
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(
                        GenerationError::cancelled().with_provider(provider.provider_type())
                    );
                }
                outcome = provider.generate_image(request) => outcome,
            };

            let error = match outcome {
                Ok(result) => return Ok(result),
                Err(error) => error,
            };

            if attempt >= max_attempts || !self.should_retry(&error) {
                if attempt > 1 {
                    log::warn!(
                        "🔁 {} failed after {} attempt(s): {}",
                        provider.provider_type(),
                        attempt,
                        error
                    );
                }
                return Err(error);
            }

            let delay = self.delay_for(attempt);
            log::warn!(
                "🔁 {} attempt {}/{} failed ({}), retrying in {}ms",
                provider.provider_type(),
                attempt,
                max_attempts,
                error.code,
                delay.as_millis()
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(
                        GenerationError::cancelled().with_provider(provider.provider_type())
                    );
                }
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}
