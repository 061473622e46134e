use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::Mutex;

use crate::ai_gateway::{
    error::{GatewayError, GatewayErrorKind},
    types::{BackendId, ReliabilityConfig},
};

/// Retry decisions plus one circuit breaker per backend.
///
/// A request is retried only while nothing has been produced for it yet;
/// partial output is never stitched onto a second attempt.
#[derive(Clone)]
pub struct ReliabilityLayer {
    config: ReliabilityConfig,
    breakers: Arc<Mutex<HashMap<BackendId, Breaker>>>,
}

/// `Closed` counts consecutive transient failures. After the threshold the
/// breaker is `Open` until its deadline, then lets exactly one trial request
/// through (`Trial`) whose outcome closes or re-opens it.
#[derive(Debug, Clone, Copy)]
enum Breaker {
    Closed { failures: u32 },
    Open { until: Instant },
    Trial,
}

impl Default for Breaker {
    fn default() -> Self {
        Breaker::Closed { failures: 0 }
    }
}

impl ReliabilityLayer {
    pub fn new(config: ReliabilityConfig) -> Self {
        Self {
            config,
            breakers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn ensure_backend_allowed(&self, backend_id: &BackendId) -> Result<(), GatewayError> {
        let mut breakers = self.breakers.lock().await;
        let breaker = breakers.entry(backend_id.clone()).or_default();

        match *breaker {
            Breaker::Closed { .. } => Ok(()),
            Breaker::Open { until } if Instant::now() >= until => {
                *breaker = Breaker::Trial;
                Ok(())
            }
            Breaker::Open { .. } | Breaker::Trial => Err(GatewayError::new(
                GatewayErrorKind::CircuitOpen,
                format!("circuit breaker is open for backend '{}'", backend_id),
            )
            .with_backend_id(backend_id.clone())),
        }
    }

    pub async fn record_success(&self, backend_id: &BackendId) {
        self.breakers
            .lock()
            .await
            .insert(backend_id.clone(), Breaker::default());
    }

    pub async fn record_failure(&self, backend_id: &BackendId, err: &GatewayError) {
        let mut breakers = self.breakers.lock().await;
        let breaker = breakers.entry(backend_id.clone()).or_default();

        if !err.kind.is_transient() {
            // A non-transient failure says nothing about backend health.
            if matches!(breaker, Breaker::Trial) {
                *breaker = Breaker::default();
            }
            return;
        }

        let threshold = self.config.breaker_failure_threshold.max(1);
        let failures = match *breaker {
            Breaker::Closed { failures } => failures.saturating_add(1),
            Breaker::Trial => threshold,
            Breaker::Open { .. } => return,
        };
        if failures < threshold {
            *breaker = Breaker::Closed { failures };
            return;
        }

        let open_for = Duration::from_millis(self.config.breaker_open_ms.max(1));
        *breaker = Breaker::Open {
            until: Instant::now() + open_for,
        };
        tracing::warn!(
            target: "ai_gateway",
            backend_id = %backend_id,
            failures = failures,
            open_ms = self.config.breaker_open_ms,
            "circuit_opened"
        );
    }

    /// Exponential backoff capped at `backoff_max_ms`, spread by a small
    /// deterministic factor so parallel encounters do not retry in lockstep.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.backoff_base_ms.max(1);
        let max = self.config.backoff_max_ms.max(1);
        let exponential = base.saturating_mul(1_u64 << attempt.min(16)).min(max);
        let spread_percent = 90 + u64::from(attempt % 3) * 5;
        Duration::from_millis(exponential * spread_percent / 100)
    }

    pub fn can_retry(&self, err: &GatewayError, attempt: u32, emitted_output: bool) -> bool {
        err.retryable && !emitted_output && attempt < self.config.max_retries
    }
}
