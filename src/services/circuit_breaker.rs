use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::db::models::ProviderType;

type BreakerKey = (Uuid, ProviderType);

#[derive(Debug, Clone, Copy)]
struct BreakerState {
    failures: u32,
    last_failure: Instant,
}

/// Per tenant+provider circuit breaker. Process-local and in-memory; losing
/// the state on restart just means breakers start closed again.
///
/// closed -> open after `threshold` consecutive failures; open -> closed
/// once `timeout` has elapsed since the last failure, resetting the count.
pub struct CircuitBreaker {
    threshold: u32,
    timeout: Duration,
    states: Mutex<HashMap<BreakerKey, BreakerState>>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, timeout: Duration) -> Self {
        Self {
            threshold,
            timeout,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// True while the breaker is open for this tenant+provider pair. An
    /// expired breaker is reset to closed as a side effect of the check.
    pub fn is_open(&self, tenant_id: Uuid, provider: ProviderType) -> bool {
        let mut states = self.states.lock().expect("breaker lock poisoned");
        let key = (tenant_id, provider);

        match states.get(&key) {
            Some(state) if state.failures >= self.threshold => {
                if state.last_failure.elapsed() >= self.timeout {
                    states.remove(&key);
                    tracing::info!(
                        tenant_id = %tenant_id,
                        provider = %provider,
                        "circuit breaker reset after timeout"
                    );
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    pub fn record_failure(&self, tenant_id: Uuid, provider: ProviderType) {
        let mut states = self.states.lock().expect("breaker lock poisoned");
        let state = states
            .entry((tenant_id, provider))
            .or_insert(BreakerState {
                failures: 0,
                last_failure: Instant::now(),
            });
        state.failures += 1;
        state.last_failure = Instant::now();

        if state.failures >= self.threshold {
            tracing::warn!(
                tenant_id = %tenant_id,
                provider = %provider,
                failures = state.failures,
                "circuit breaker opened"
            );
        }
    }

    pub fn record_success(&self, tenant_id: Uuid, provider: ProviderType) {
        let mut states = self.states.lock().expect("breaker lock poisoned");
        states.remove(&(tenant_id, provider));
    }

    pub fn failure_count(&self, tenant_id: Uuid, provider: ProviderType) -> u32 {
        let states = self.states.lock().expect("breaker lock poisoned");
        states
            .get(&(tenant_id, provider))
            .map(|s| s.failures)
            .unwrap_or(0)
    }
}
