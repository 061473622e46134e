use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::ai_gateway::{
    adapters::{BackendAdapter, http_common},
    error::{GatewayError, GatewayErrorKind, protocol_violation},
    types::{
        AdapterContext, BackendCapabilities, BackendDialect, BackendRawEvent, CanonicalRequest,
        OutputMode, UsageStats,
    },
};

#[derive(Clone)]
pub struct OpenAiCompatibleAdapter {
    client: Client,
}

impl OpenAiCompatibleAdapter {
    pub fn new() -> Result<Self, GatewayError> {
        Ok(Self {
            client: http_common::build_client()?,
        })
    }
}

#[async_trait]
impl BackendAdapter for OpenAiCompatibleAdapter {
    fn dialect(&self) -> BackendDialect {
        BackendDialect::OpenAiCompatible
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
                "openai-compatible backend requires endpoint",
            )
            .with_retryable(false)
            .with_backend_id(ctx.backend_id.clone())
        })?;

        let url = format!("{}/chat/completions", endpoint.trim_end_matches('/'));
        let body = build_body(&ctx.model, &req);
        tracing::debug!(
            target: "ai_gateway.openai_compatible",
            request_id = %ctx.request_id,
            backend_id = %ctx.backend_id,
            model = %ctx.model,
            "openai_dispatch"
        );

        let payload =
            http_common::post_json(&self.client, url, &ctx, &body, "openai-compatible").await?;
        parse_payload(&payload).map_err(|err| err.with_backend_id(ctx.backend_id.clone()))
    }
}

fn build_body(model: &str, req: &CanonicalRequest) -> Value {
    let mut body = json!({
        "model": model,
        "messages": http_common::messages_to_wire(&req.messages),
    });

    if matches!(req.output_mode, OutputMode::JsonObject) {
        body["response_format"] = json!({"type": "json_object"});
    }
    if let Some(temperature) = req.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = req.limits.max_output_tokens {
        body["max_tokens"] = Value::Number(max_tokens.into());
    }

    body
}

pub(crate) fn parse_payload(payload: &Value) -> Result<Vec<BackendRawEvent>, GatewayError> {
    let mut events = Vec::new();

    let choice = payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .ok_or_else(|| protocol_violation("openai-compatible response missing choices"))?;

    if let Some(content) = choice
        .get("message")
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .filter(|content| !content.is_empty())
    {
        events.push(BackendRawEvent::OutputTextDelta {
            delta: content.to_string(),
        });
    }

    if let Some(usage) = payload.get("usage").filter(|usage| !usage.is_null()) {
        events.push(BackendRawEvent::Usage {
            usage: parse_usage(usage),
        });
    }

    let finish_reason = choice.get("finish_reason").and_then(Value::as_str);
    events.push(BackendRawEvent::Completed {
        finish_reason: http_common::parse_finish_reason(finish_reason),
    });

    Ok(events)
}

fn parse_usage(usage: &Value) -> UsageStats {
    UsageStats {
        input_tokens: usage
            .get("prompt_tokens")
            .and_then(Value::as_u64)
            .or_else(|| usage.get("input_tokens").and_then(Value::as_u64)),
        output_tokens: usage
            .get("completion_tokens")
            .and_then(Value::as_u64)
            .or_else(|| usage.get("output_tokens").and_then(Value::as_u64)),
        total_tokens: usage.get("total_tokens").and_then(Value::as_u64),
    }
}
