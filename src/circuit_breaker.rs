//! Per-provider circuit breaker.
//!
//! There is no explicit half-open state. An open circuit becomes available
//! again once `reset_timeout` has passed since its last failure, and the
//! availability check itself performs that reset: the failure count drops
//! to zero and the next call goes through as the trial. A success closes the
//! circuit completely; a failure starts counting toward the threshold again.

use crate::config::CircuitBreakerConfig;
use crate::models::ProviderType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Default)]
struct CircuitState {
    failure_count: u32,
    last_failure: Option<Instant>,
    open: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CircuitStatus {
    pub failure_count: u32,
    pub open: bool,
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    states: Mutex<HashMap<ProviderType, CircuitState>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn is_provider_available(&self, provider: ProviderType) -> bool {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        let Some(state) = states.get_mut(&provider) else {
            return true;
        };
        if !state.open {
            return true;
        }

        let cooled_down = state
            .last_failure
            .map_or(true, |at| at.elapsed() > self.config.reset_timeout);
        if cooled_down {
            log::info!(
                "🔌 Circuit for {} cooled down, allowing a trial request",
                provider
            );
            state.open = false;
            state.failure_count = 0;
            true
        } else {
            false
        }
    }

    pub fn record_failure(&self, provider: ProviderType) {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        let state = states.entry(provider).or_default();
        state.failure_count += 1;
        state.last_failure = Some(Instant::now());

        if !state.open && state.failure_count >= self.config.failure_threshold {
            state.open = true;
            log::warn!(
                "⚡ Circuit opened for {} after {} consecutive failures",
                provider,
                state.failure_count
            );
        }
    }

    pub fn record_success(&self, provider: ProviderType) {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(state) = states.get_mut(&provider) {
            if state.open || state.failure_count > 0 {
                log::debug!("Circuit for {} closed after success", provider);
            }
            *state = CircuitState::default();
        }
    }

    /// Read-only view; unlike `is_provider_available` this never resets.
    pub fn status(&self, provider: ProviderType) -> CircuitStatus {
        let states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states
            .get(&provider)
            .map(|s| CircuitStatus {
                failure_count: s.failure_count,
                open: s.open,
            })
            .unwrap_or_default()
    }

    pub fn reset(&self, provider: ProviderType) {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states.remove(&provider);
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
