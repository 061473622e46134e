use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::ai_gateway::{
    adapters::{BackendAdapter, http_common},
    error::{GatewayError, GatewayErrorKind},
    types::{
        AdapterContext, BackendCapabilities, BackendDialect, BackendRawEvent, CanonicalRequest,
        OutputMode, UsageStats,
    },
};

#[derive(Clone)]
pub struct OllamaAdapter {
    client: Client,
}

impl OllamaAdapter {
    pub fn new() -> Result<Self, GatewayError> {
        Ok(Self {
            client: http_common::build_client()?,
        })
    }
}

#[async_trait]
impl BackendAdapter for OllamaAdapter {
    fn dialect(&self) -> BackendDialect {
        BackendDialect::Ollama
    }

    fn static_capabilities(&self) -> BackendCapabilities {
        BackendCapabilities { json_mode: true }
    }

    async fn invoke(
        &self,
        ctx: AdapterContext,
        req: CanonicalRequest,
    ) -> Result<Vec<BackendRawEvent>, GatewayError> {
        let endpoint = ctx.profile.endpoint.clone().ok_or_else(|| {
            GatewayError::new(
                GatewayErrorKind::InvalidRequest,
                "ollama backend requires endpoint",
            )
            .with_retryable(false)
            .with_backend_id(ctx.backend_id.clone())
        })?;

        let url = format!("{}/api/chat", endpoint.trim_end_matches('/'));
        let body = build_body(&ctx.model, &req);
        let started_at = Instant::now();

        let payload = http_common::post_json(&self.client, url, &ctx, &body, "ollama").await;
        tracing::debug!(
            target: "ai_gateway.ollama",
            request_id = %ctx.request_id,
            backend_id = %ctx.backend_id,
            model = %ctx.model,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            ok = payload.is_ok(),
            "ollama_dispatch_end"
        );

        parse_ollama_payload(&payload?).map_err(|err| err.with_backend_id(ctx.backend_id.clone()))
    }
}

fn build_body(model: &str, req: &CanonicalRequest) -> Value {
    let mut body = json!({
        "model": model,
        "messages": http_common::messages_to_wire(&req.messages),
        "stream": false,
    });

    if matches!(req.output_mode, OutputMode::JsonObject) {
        body["format"] = Value::String("json".to_string());
    }

    let mut options = serde_json::Map::new();
    if let Some(max_tokens) = req.limits.max_output_tokens {
        options.insert("num_predict".to_string(), json!(max_tokens));
    }
    if let Some(temperature) = req.temperature {
        options.insert("temperature".to_string(), json!(temperature));
    }
    if !options.is_empty() {
        body["options"] = Value::Object(options);
    }

    body
}

pub(crate) fn parse_ollama_payload(payload: &Value) -> Result<Vec<BackendRawEvent>, GatewayError> {
    if let Some(error) = payload.get("error").and_then(Value::as_str) {
        return Err(GatewayError::new(
            GatewayErrorKind::BackendPermanent,
            format!("ollama reported error: {}", error),
        )
        .with_retryable(false));
    }

    let mut events = Vec::new();

    if let Some(content) = payload
        .get("message")
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .filter(|content| !content.is_empty())
    {
        events.push(BackendRawEvent::OutputTextDelta {
            delta: content.to_string(),
        });
    }

    if payload.get("done").and_then(Value::as_bool) == Some(true) {
        let input_tokens = payload.get("prompt_eval_count").and_then(Value::as_u64);
        let output_tokens = payload.get("eval_count").and_then(Value::as_u64);
        events.push(BackendRawEvent::Usage {
            usage: UsageStats {
                input_tokens,
                output_tokens,
                total_tokens: input_tokens.zip(output_tokens).map(|(a, b)| a + b),
            },
        });
        events.push(BackendRawEvent::Completed {
            finish_reason: http_common::parse_finish_reason(
                payload.get("done_reason").and_then(Value::as_str),
            ),
        });
    }

    Ok(events)
}
