use std::{sync::Arc, time::Instant};

use tokio::time::{sleep, timeout_at};
use tracing::Instrument;

use crate::ai_gateway::{
    adapters::{AdapterRegistry, BackendAdapter, build_default_adapters},
    budget::BudgetEnforcer,
    credentials::CredentialProvider,
    error::{GatewayError, GatewayErrorKind, protocol_violation},
    reliability::ReliabilityLayer,
    request_normalizer::{RequestNormalizer, redact_metadata},
    router::{BackendRouter, SelectedBackend},
    telemetry::{GatewayTelemetryEvent, NoopTelemetrySink, TelemetrySink},
    types::{
        AIGatewayConfig, AdapterContext, BackendRawEvent, CanonicalRequest, ChatRequest,
        ChatResponse, FinishReason, OutputMode, ResolvedCredential, UsageStats,
    },
};

pub struct AIGateway {
    router: BackendRouter,
    credential_provider: Arc<dyn CredentialProvider>,
    adapters: AdapterRegistry,
    request_normalizer: RequestNormalizer,
    budget_enforcer: BudgetEnforcer,
    reliability: ReliabilityLayer,
    telemetry: Arc<dyn TelemetrySink>,
}

struct AttemptOutcome {
    output_text: String,
    usage: Option<UsageStats>,
    finish_reason: FinishReason,
}

struct AttemptFailure {
    error: GatewayError,
    emitted_output: bool,
}

impl AIGateway {
    pub fn new(
        config: AIGatewayConfig,
        credential_provider: Arc<dyn CredentialProvider>,
    ) -> Result<Self, GatewayError> {
        let router = BackendRouter::new(&config)?;
        Ok(Self {
            router,
            credential_provider,
            adapters: build_default_adapters()?,
            request_normalizer: RequestNormalizer,
            budget_enforcer: BudgetEnforcer::new(config.budget),
            reliability: ReliabilityLayer::new(config.reliability),
            telemetry: Arc::new(NoopTelemetrySink),
        })
    }

    pub fn with_adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Runs one request to completion, retrying transient failures that
    /// happen before any output was produced.
    pub async fn chat_once(&self, request: ChatRequest) -> Result<ChatResponse, GatewayError> {
        let canonical_request = self.request_normalizer.normalize(request)?;
        let selected = self.router.select(&canonical_request)?;
        let credential = self
            .credential_provider
            .resolve(&selected.profile.credential, &selected.profile)
            .await?;

        let adapter = self
            .adapters
            .get(&selected.profile.dialect)
            .cloned()
            .ok_or_else(|| {
                GatewayError::new(
                    GatewayErrorKind::InvalidRequest,
                    format!(
                        "adapter for dialect {:?} is not registered",
                        selected.profile.dialect
                    ),
                )
                .with_retryable(false)
                .with_backend_id(selected.backend_id.clone())
            })?;

        let json_mode = selected
            .profile
            .capabilities
            .as_ref()
            .map_or_else(|| adapter.static_capabilities().json_mode, |caps| caps.json_mode);
        if canonical_request.output_mode == OutputMode::JsonObject && !json_mode {
            tracing::debug!(
                target: "ai_gateway",
                backend_id = %selected.backend_id,
                "json_mode_unsupported_prompt_only"
            );
        }

        let stage = canonical_request.metadata.get("stage").cloned();
        let request_span = tracing::info_span!(
            target: "ai_gateway",
            "gateway_request",
            request_id = %canonical_request.request_id,
            backend_id = %selected.backend_id,
            model = %selected.resolved_model,
            stage = stage.as_deref().unwrap_or("-")
        );

        self.run_attempts(canonical_request, selected, adapter, credential)
            .instrument(request_span)
            .await
    }

    async fn run_attempts(
        &self,
        canonical_request: CanonicalRequest,
        selected: SelectedBackend,
        adapter: Arc<dyn BackendAdapter>,
        credential: ResolvedCredential,
    ) -> Result<ChatResponse, GatewayError> {
        let request_id = canonical_request.request_id.clone();
        let lease = self
            .budget_enforcer
            .pre_dispatch(&canonical_request, &selected.backend_id)
            .await?;

        tracing::debug!(
            target: "ai_gateway",
            dialect = ?selected.profile.dialect,
            output_mode = ?canonical_request.output_mode,
            max_output_tokens = ?canonical_request.limits.max_output_tokens,
            effective_timeout_ms = lease.effective_timeout.as_millis() as u64,
            metadata = ?redact_metadata(&canonical_request.metadata),
            "chat_prepared"
        );
        self.telemetry.on_event(GatewayTelemetryEvent::RequestStarted {
            request_id: request_id.clone(),
            backend_id: selected.backend_id.clone(),
            model: selected.resolved_model.clone(),
            stage: canonical_request.metadata.get("stage").cloned(),
        });

        let started_at = Instant::now();
        let mut attempt = 0_u32;
        loop {
            self.telemetry.on_event(GatewayTelemetryEvent::AttemptStarted {
                request_id: request_id.clone(),
                attempt,
            });

            let result = match self
                .reliability
                .ensure_backend_allowed(&selected.backend_id)
                .await
            {
                Ok(()) => {
                    let ctx = AdapterContext {
                        backend_id: selected.backend_id.clone(),
                        model: selected.resolved_model.clone(),
                        profile: selected.profile.clone(),
                        credential: credential.clone(),
                        timeout: lease.effective_timeout,
                        request_id: request_id.clone(),
                    };
                    self.run_attempt(adapter.as_ref(), ctx, canonical_request.clone())
                        .await
                }
                Err(error) => {
                    // An open breaker is final for this request.
                    self.telemetry.on_event(GatewayTelemetryEvent::RequestFailed {
                        request_id: request_id.clone(),
                        attempts: attempt + 1,
                        error_kind: error.kind,
                    });
                    return Err(error);
                }
            };

            match result {
                Ok(outcome) => {
                    self.reliability.record_success(&selected.backend_id).await;
                    if let Some(usage) = &outcome.usage {
                        self.budget_enforcer
                            .observe_usage(&selected.backend_id, usage);
                    }
                    let elapsed_ms = started_at.elapsed().as_millis() as u64;
                    self.telemetry
                        .on_event(GatewayTelemetryEvent::RequestCompleted {
                            request_id: request_id.clone(),
                            attempts: attempt + 1,
                            elapsed_ms,
                            usage: outcome.usage.clone(),
                        });
                    tracing::debug!(
                        target: "ai_gateway",
                        attempts = attempt + 1,
                        elapsed_ms = elapsed_ms,
                        finish_reason = ?outcome.finish_reason,
                        output_chars = outcome.output_text.len(),
                        "request_completed"
                    );
                    drop(lease);
                    return Ok(ChatResponse {
                        request_id,
                        backend_id: selected.backend_id,
                        model: selected.resolved_model,
                        output_text: outcome.output_text,
                        usage: outcome.usage,
                        finish_reason: outcome.finish_reason,
                        attempts: attempt + 1,
                    });
                }
                Err(failure) => {
                    let error = failure.error;
                    self.reliability
                        .record_failure(&selected.backend_id, &error)
                        .await;
                    let can_retry =
                        self.reliability
                            .can_retry(&error, attempt, failure.emitted_output);
                    self.telemetry.on_event(GatewayTelemetryEvent::AttemptFailed {
                        request_id: request_id.clone(),
                        attempt,
                        kind: error.kind,
                        retryable: error.retryable,
                    });
                    tracing::debug!(
                        target: "ai_gateway",
                        attempt = attempt,
                        kind = ?error.kind,
                        retryable = error.retryable,
                        can_retry = can_retry,
                        emitted_output = failure.emitted_output,
                        error = %error.message,
                        "attempt_failed"
                    );

                    if !can_retry {
                        self.telemetry.on_event(GatewayTelemetryEvent::RequestFailed {
                            request_id: request_id.clone(),
                            attempts: attempt + 1,
                            error_kind: error.kind,
                        });
                        return Err(error);
                    }

                    attempt += 1;
                    sleep(self.reliability.backoff_delay(attempt)).await;
                }
            }
        }
    }

    async fn run_attempt(
        &self,
        adapter: &dyn BackendAdapter,
        ctx: AdapterContext,
        request: CanonicalRequest,
    ) -> Result<AttemptOutcome, AttemptFailure> {
        let backend_id = ctx.backend_id.clone();
        let deadline = tokio::time::Instant::now() + ctx.timeout;
        let timeout_ms = ctx.timeout.as_millis() as u64;

        let events = match timeout_at(deadline, adapter.invoke(ctx, request)).await {
            Ok(Ok(events)) => events,
            Ok(Err(error)) => {
                return Err(AttemptFailure {
                    error: error.with_backend_id(backend_id.clone()),
                    emitted_output: false,
                });
            }
            Err(_) => {
                return Err(AttemptFailure {
                    error: GatewayError::new(
                        GatewayErrorKind::Timeout,
                        format!("request exceeded {} ms", timeout_ms),
                    )
                    .with_backend_id(backend_id.clone()),
                    emitted_output: false,
                });
            }
        };

        let mut output_text = String::new();
        let mut usage: Option<UsageStats> = None;

        for event in events {
            match event {
                BackendRawEvent::OutputTextDelta { delta } => output_text.push_str(&delta),
                BackendRawEvent::Usage { usage: current } => {
                    if usage.replace(current).is_some() {
                        return Err(AttemptFailure {
                            error: protocol_violation("duplicate usage event received")
                                .with_backend_id(backend_id.clone()),
                            emitted_output: !output_text.is_empty(),
                        });
                    }
                }
                BackendRawEvent::Completed { finish_reason } => {
                    if finish_reason == FinishReason::Length {
                        tracing::warn!(
                            target: "ai_gateway",
                            backend_id = %backend_id,
                            output_chars = output_text.len(),
                            "output_truncated_at_token_limit"
                        );
                    }
                    return Ok(AttemptOutcome {
                        output_text,
                        usage,
                        finish_reason,
                    });
                }
                BackendRawEvent::Failed { error } => {
                    return Err(AttemptFailure {
                        error: error.with_backend_id(backend_id.clone()),
                        emitted_output: !output_text.is_empty(),
                    });
                }
            }
        }

        Err(AttemptFailure {
            error: protocol_violation("backend reply ended without terminal event")
                .with_backend_id(backend_id),
            emitted_output: !output_text.is_empty(),
        })
    }
}
