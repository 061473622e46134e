use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;

use encounter_docgen::ai_gateway::{
    AIGateway,
    adapters::BackendAdapter,
    error::{GatewayError, GatewayErrorKind},
    telemetry::{GatewayTelemetryEvent, TelemetrySink},
    types::{
        AdapterContext, BackendCapabilities, BackendDialect, BackendRawEvent, CanonicalRequest,
        FinishReason, OutputMode, UsageStats,
    },
};

use crate::support::{StaticCredentialProvider, chat_request, gateway_config};

/// Replays one scripted event list per call; calls past the script reuse the
/// last entry.
struct ScriptedAdapter {
    scripts: Vec<Result<Vec<BackendRawEvent>, GatewayError>>,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<CanonicalRequest>>>,
}

impl ScriptedAdapter {
    fn new(scripts: Vec<Result<Vec<BackendRawEvent>, GatewayError>>) -> Self {
        Self {
            scripts,
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl BackendAdapter for ScriptedAdapter {
    fn dialect(&self) -> BackendDialect {
        BackendDialect::OpenAiCompatible
    }

    fn static_capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::default()
    }

    async fn invoke(
        &self,
        _ctx: AdapterContext,
        req: CanonicalRequest,
    ) -> Result<Vec<BackendRawEvent>, GatewayError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().expect("lock").push(req);
        self.scripts[call.min(self.scripts.len() - 1)].clone()
    }
}

#[derive(Default)]
struct RecordingTelemetry {
    events: Mutex<Vec<GatewayTelemetryEvent>>,
}

impl TelemetrySink for RecordingTelemetry {
    fn on_event(&self, event: GatewayTelemetryEvent) {
        self.events.lock().expect("lock").push(event);
    }
}

fn transient(message: &str) -> GatewayError {
    GatewayError::new(GatewayErrorKind::BackendTransient, message).with_retryable(true)
}

fn completed(text: &str) -> Vec<BackendRawEvent> {
    vec![
        BackendRawEvent::OutputTextDelta {
            delta: text.to_string(),
        },
        BackendRawEvent::Usage {
            usage: UsageStats {
                input_tokens: Some(10),
                output_tokens: Some(2),
                total_tokens: Some(12),
            },
        },
        BackendRawEvent::Completed {
            finish_reason: FinishReason::Stop,
        },
    ]
}

fn gateway_with(adapter: Arc<ScriptedAdapter>) -> AIGateway {
    let mut adapters: HashMap<BackendDialect, Arc<dyn BackendAdapter>> = HashMap::new();
    adapters.insert(BackendDialect::OpenAiCompatible, adapter);
    AIGateway::new(gateway_config(), Arc::new(StaticCredentialProvider))
        .expect("gateway should build")
        .with_adapters(adapters)
}

#[tokio::test]
async fn retries_before_first_output_and_succeeds() {
    let adapter = Arc::new(ScriptedAdapter::new(vec![
        Err(transient("first attempt fails")),
        Ok(completed("ok")),
    ]));
    let telemetry = Arc::new(RecordingTelemetry::default());
    let gateway = gateway_with(adapter.clone()).with_telemetry(telemetry.clone());

    let response = gateway
        .chat_once(chat_request(OutputMode::Text))
        .await
        .expect("request should succeed after retry");

    assert_eq!(response.output_text, "ok");
    assert_eq!(response.attempts, 2);
    assert_eq!(response.usage.and_then(|usage| usage.total_tokens), Some(12));
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);

    let events = telemetry.events.lock().expect("lock");
    assert!(matches!(
        events.first(),
        Some(GatewayTelemetryEvent::RequestStarted { stage: Some(stage), .. })
            if stage == "document_predictor"
    ));
    assert!(matches!(
        events.last(),
        Some(GatewayTelemetryEvent::RequestCompleted { attempts: 2, .. })
    ));
}

#[tokio::test]
async fn does_not_retry_after_output_was_emitted() {
    let adapter = Arc::new(ScriptedAdapter::new(vec![Ok(vec![
        BackendRawEvent::OutputTextDelta {
            delta: "partial".to_string(),
        },
        BackendRawEvent::Failed {
            error: transient("backend failed mid-reply"),
        },
    ])]));
    let gateway = gateway_with(adapter.clone());

    let err = gateway
        .chat_once(chat_request(OutputMode::Text))
        .await
        .expect_err("request should fail without retry after output");
    assert_eq!(err.kind, GatewayErrorKind::BackendTransient);
    assert_eq!(err.backend_id.as_deref(), Some("openai-default"));
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn gives_up_after_max_retries() {
    let adapter = Arc::new(ScriptedAdapter::new(vec![Err(transient("down"))]));
    let gateway = gateway_with(adapter.clone());

    let err = gateway
        .chat_once(chat_request(OutputMode::Text))
        .await
        .expect_err("all attempts fail");
    assert_eq!(err.kind, GatewayErrorKind::BackendTransient);
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn permanent_failures_are_not_retried() {
    let adapter = Arc::new(ScriptedAdapter::new(vec![Err(GatewayError::new(
        GatewayErrorKind::Authentication,
        "bad key",
    ))]));
    let gateway = gateway_with(adapter.clone());

    let err = gateway
        .chat_once(chat_request(OutputMode::Text))
        .await
        .expect_err("authentication failure");
    assert_eq!(err.kind, GatewayErrorKind::Authentication);
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reply_without_terminal_event_is_a_protocol_violation() {
    let adapter = Arc::new(ScriptedAdapter::new(vec![Ok(vec![
        BackendRawEvent::OutputTextDelta {
            delta: "dangling".to_string(),
        },
    ])]));
    let gateway = gateway_with(adapter);

    let err = gateway
        .chat_once(chat_request(OutputMode::Text))
        .await
        .expect_err("missing terminal event");
    assert_eq!(err.kind, GatewayErrorKind::ProtocolViolation);
}

#[tokio::test]
async fn open_breaker_rejects_follow_up_requests() {
    let mut config = gateway_config();
    config.reliability.max_retries = 0;
    config.reliability.breaker_failure_threshold = 1;
    config.reliability.breaker_open_ms = 60_000;

    let adapter = Arc::new(ScriptedAdapter::new(vec![Err(transient("down"))]));
    let mut adapters: HashMap<BackendDialect, Arc<dyn BackendAdapter>> = HashMap::new();
    adapters.insert(BackendDialect::OpenAiCompatible, adapter.clone());
    let gateway = AIGateway::new(config, Arc::new(StaticCredentialProvider))
        .expect("gateway should build")
        .with_adapters(adapters);

    let first = gateway
        .chat_once(chat_request(OutputMode::Text))
        .await
        .expect_err("first request fails");
    assert_eq!(first.kind, GatewayErrorKind::BackendTransient);

    let second = gateway
        .chat_once(chat_request(OutputMode::Text))
        .await
        .expect_err("breaker is open");
    assert_eq!(second.kind, GatewayErrorKind::CircuitOpen);
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn json_mode_and_stage_metadata_reach_the_adapter() {
    let adapter = Arc::new(ScriptedAdapter::new(vec![Ok(completed(
        r#"{"documents": []}"#,
    ))]));
    let gateway = gateway_with(adapter.clone());

    let response = gateway
        .chat_once(chat_request(OutputMode::JsonObject))
        .await
        .expect("json request succeeds");
    assert_eq!(response.output_text, r#"{"documents": []}"#);
    assert_eq!(response.model, "m1");

    let seen = adapter.seen.lock().expect("lock");
    assert_eq!(seen[0].output_mode, OutputMode::JsonObject);
    assert_eq!(seen[0].limits.max_output_tokens, Some(16_000));
    assert_eq!(
        seen[0].metadata.get("encounter_id").map(String::as_str),
        Some("E1")
    );
}

#[tokio::test]
async fn invalid_requests_never_reach_the_adapter() {
    let adapter = Arc::new(ScriptedAdapter::new(vec![Ok(completed("unused"))]));
    let gateway = gateway_with(adapter.clone());

    let mut request = chat_request(OutputMode::Text);
    request.backend_id = Some("missing".to_string());
    let err = gateway
        .chat_once(request)
        .await
        .expect_err("unknown backend");
    assert_eq!(err.kind, GatewayErrorKind::InvalidRequest);
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn truncated_reply_is_returned_with_length_finish() {
    let adapter = Arc::new(ScriptedAdapter::new(vec![Ok(vec![
        BackendRawEvent::OutputTextDelta {
            delta: "Assessment: acute bro".to_string(),
        },
        BackendRawEvent::Completed {
            finish_reason: FinishReason::Length,
        },
    ])]));
    let gateway = gateway_with(adapter.clone());

    let response = gateway
        .chat_once(chat_request(OutputMode::Text))
        .await
        .expect("truncation is not a transport failure");
    assert_eq!(response.finish_reason, FinishReason::Length);
    assert_eq!(response.output_text, "Assessment: acute bro");
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
}
