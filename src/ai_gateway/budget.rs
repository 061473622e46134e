use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::{
    sync::{Mutex, OwnedSemaphorePermit, Semaphore},
    time::sleep,
};

use crate::ai_gateway::{
    error::{GatewayError, GatewayErrorKind},
    types::{BackendId, BudgetConfig, CanonicalRequest, UsageStats},
};

#[derive(Clone)]
pub struct BudgetEnforcer {
    config: BudgetConfig,
    permits: Arc<Mutex<HashMap<BackendId, Arc<Semaphore>>>>,
    token_buckets: Arc<Mutex<HashMap<BackendId, TokenBucket>>>,
}

/// Held for the whole lifetime of one request; dropping it frees the
/// backend concurrency slot.
#[derive(Debug)]
pub struct BudgetLease {
    pub backend_id: BackendId,
    pub effective_timeout: Duration,
    _permit: OwnedSemaphorePermit,
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl BudgetEnforcer {
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            config,
            permits: Arc::new(Mutex::new(HashMap::new())),
            token_buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn pre_dispatch(
        &self,
        request: &CanonicalRequest,
        backend_id: &BackendId,
    ) -> Result<BudgetLease, GatewayError> {
        if let (Some(requested), Some(budget)) = (
            request.limits.max_output_tokens,
            self.config.max_usage_tokens_per_request,
        ) {
            if requested > budget {
                return Err(GatewayError::new(
                    GatewayErrorKind::BudgetExceeded,
                    format!(
                        "requested max_output_tokens {} exceeds configured budget {}",
                        requested, budget
                    ),
                )
                .with_retryable(false)
                .with_backend_id(backend_id.clone()));
            }
        }

        self.acquire_rate_token(backend_id).await;

        let semaphore = {
            let mut guard = self.permits.lock().await;
            guard
                .entry(backend_id.clone())
                .or_insert_with(|| {
                    Arc::new(Semaphore::new(
                        self.config.max_concurrency_per_backend.max(1) as usize,
                    ))
                })
                .clone()
        };
        let permit = semaphore.acquire_owned().await.map_err(|_| {
            GatewayError::new(
                GatewayErrorKind::Internal,
                "failed to acquire backend concurrency permit",
            )
            .with_retryable(false)
            .with_backend_id(backend_id.clone())
        })?;

        Ok(BudgetLease {
            backend_id: backend_id.clone(),
            effective_timeout: self.effective_timeout(request),
            _permit: permit,
        })
    }

    pub fn effective_timeout(&self, request: &CanonicalRequest) -> Duration {
        let millis = request
            .limits
            .max_request_time_ms
            .map(|requested| requested.min(self.config.max_request_time_ms))
            .unwrap_or(self.config.max_request_time_ms)
            .max(1);
        Duration::from_millis(millis)
    }

    pub fn observe_usage(&self, backend_id: &BackendId, usage: &UsageStats) {
        let (Some(budget), Some(total)) =
            (self.config.max_usage_tokens_per_request, usage.total_tokens)
        else {
            return;
        };

        if total > budget {
            tracing::warn!(
                target: "ai_gateway",
                backend_id = %backend_id,
                total_tokens = total,
                budget = budget,
                "usage_over_budget"
            );
        }
    }

    async fn acquire_rate_token(&self, backend_id: &BackendId) {
        let Some(rps) = self.config.rate_smoothing_per_second.filter(|rps| *rps > 0) else {
            return;
        };
        let rps = rps as f64;

        loop {
            let wait = {
                let mut guard = self.token_buckets.lock().await;
                let bucket = guard
                    .entry(backend_id.clone())
                    .or_insert_with(|| TokenBucket {
                        tokens: rps,
                        last_refill: Instant::now(),
                    });

                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * rps).min(rps);
                bucket.last_refill = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    let seconds = (1.0 - bucket.tokens) / rps;
                    Some(Duration::from_secs_f64(seconds.max(0.005)))
                }
            };

            match wait {
                Some(duration) => sleep(duration).await,
                None => return,
            }
        }
    }
}
