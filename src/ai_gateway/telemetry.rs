use crate::ai_gateway::{
    error::GatewayErrorKind,
    types::{BackendId, RequestId, UsageStats},
};

#[derive(Debug, Clone)]
pub enum GatewayTelemetryEvent {
    RequestStarted {
        request_id: RequestId,
        backend_id: BackendId,
        model: String,
        stage: Option<String>,
    },
    AttemptStarted {
        request_id: RequestId,
        attempt: u32,
    },
    AttemptFailed {
        request_id: RequestId,
        attempt: u32,
        kind: GatewayErrorKind,
        retryable: bool,
    },
    RequestCompleted {
        request_id: RequestId,
        attempts: u32,
        elapsed_ms: u64,
        usage: Option<UsageStats>,
    },
    RequestFailed {
        request_id: RequestId,
        attempts: u32,
        error_kind: GatewayErrorKind,
    },
}

pub trait TelemetrySink: Send + Sync {
    fn on_event(&self, event: GatewayTelemetryEvent);
}

#[derive(Default)]
pub struct NoopTelemetrySink;

impl TelemetrySink for NoopTelemetrySink {
    fn on_event(&self, _event: GatewayTelemetryEvent) {}
}

/// Forwards gateway events to `tracing` at debug level.
#[derive(Default)]
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn on_event(&self, event: GatewayTelemetryEvent) {
        match event {
            GatewayTelemetryEvent::RequestStarted {
                request_id,
                backend_id,
                model,
                stage,
            } => {
                tracing::debug!(
                    target: "ai_gateway",
                    request_id = %request_id,
                    backend_id = %backend_id,
                    model = %model,
                    stage = stage.as_deref().unwrap_or("-"),
                    "request_started"
                );
            }
            GatewayTelemetryEvent::AttemptStarted {
                request_id,
                attempt,
            } => {
                tracing::debug!(
                    target: "ai_gateway",
                    request_id = %request_id,
                    attempt = attempt,
                    "attempt_started"
                );
            }
            GatewayTelemetryEvent::AttemptFailed {
                request_id,
                attempt,
                kind,
                retryable,
            } => {
                tracing::debug!(
                    target: "ai_gateway",
                    request_id = %request_id,
                    attempt = attempt,
                    kind = ?kind,
                    retryable = retryable,
                    "attempt_failed"
                );
            }
            GatewayTelemetryEvent::RequestCompleted {
                request_id,
                attempts,
                elapsed_ms,
                usage,
            } => {
                let usage = usage.unwrap_or_default();
                tracing::debug!(
                    target: "ai_gateway",
                    request_id = %request_id,
                    attempts = attempts,
                    elapsed_ms = elapsed_ms,
                    input_tokens = ?usage.input_tokens,
                    output_tokens = ?usage.output_tokens,
                    total_tokens = ?usage.total_tokens,
                    "request_completed"
                );
            }
            GatewayTelemetryEvent::RequestFailed {
                request_id,
                attempts,
                error_kind,
            } => {
                tracing::debug!(
                    target: "ai_gateway",
                    request_id = %request_id,
                    attempts = attempts,
                    error_kind = ?error_kind,
                    "request_failed"
                );
            }
        }
    }
}
