use std::time::Duration;

use reqwest::{Client, header};
use serde_json::{Value, json};

use crate::ai_gateway::{
    error::{GatewayError, GatewayErrorKind, internal_error, protocol_violation},
    types::{AdapterContext, ChatMessage, ChatRole, FinishReason},
};

pub fn build_client() -> Result<Client, GatewayError> {
    Client::builder()
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
        .map_err(|err| internal_error(format!("failed to build http client: {}", err)))
}

pub fn role_to_wire(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    }
}

/// OpenAI and Ollama chat endpoints share the same plain-text message shape.
pub fn messages_to_wire(messages: &[ChatMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| {
            json!({
                "role": role_to_wire(message.role),
                "content": message.content,
            })
        })
        .collect()
}

pub fn parse_finish_reason(value: Option<&str>) -> FinishReason {
    match value.unwrap_or("stop") {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        other => FinishReason::Other(other.to_string()),
    }
}

pub fn map_http_error(status: u16, backend_id: &str, body: &str) -> GatewayError {
    let normalized_body = body.chars().take(240).collect::<String>();

    let mut err = match status {
        401 => GatewayError::new(GatewayErrorKind::Authentication, "authentication failed"),
        403 => GatewayError::new(GatewayErrorKind::Authorization, "authorization failed"),
        408 | 429 => GatewayError::new(
            GatewayErrorKind::RateLimited,
            format!("backend returned status {}", status),
        ),
        400..=499 => GatewayError::new(
            GatewayErrorKind::InvalidRequest,
            format!("backend returned status {}", status),
        ),
        501 | 505 => GatewayError::new(
            GatewayErrorKind::BackendPermanent,
            format!("backend returned status {}", status),
        )
        .with_retryable(false),
        _ => GatewayError::new(
            GatewayErrorKind::BackendTransient,
            format!("backend returned status {}", status),
        ),
    }
    .with_backend_id(backend_id.to_string())
    .with_provider_http_status(status);

    if !normalized_body.is_empty() {
        err.message = format!("{}: {}", err.message, normalized_body);
    }

    err
}

pub fn transport_error(backend_id: &str, context: &str, err: reqwest::Error) -> GatewayError {
    let kind = if err.is_timeout() {
        GatewayErrorKind::Timeout
    } else {
        GatewayErrorKind::BackendTransient
    };
    GatewayError::new(kind, format!("{}: {}", context, err)).with_backend_id(backend_id.to_string())
}

/// Posts `body` and decodes the whole JSON reply. Non-2xx statuses map
/// through [`map_http_error`].
pub async fn post_json(
    client: &Client,
    url: String,
    ctx: &AdapterContext,
    body: &Value,
    label: &str,
) -> Result<Value, GatewayError> {
    let mut request = client
        .post(url)
        .timeout(ctx.timeout)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-request-id", ctx.request_id.clone())
        .json(body);
    if let Some(auth_header) = ctx.credential.auth_header.clone() {
        request = request.header(header::AUTHORIZATION, auth_header);
    }
    for (key, value) in ctx.credential.extra_headers.clone() {
        request = request.header(key, value);
    }

    let response = request
        .send()
        .await
        .map_err(|err| transport_error(&ctx.backend_id, &format!("{} request failed", label), err))?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(map_http_error(status, &ctx.backend_id, &body));
    }

    response.json::<Value>().await.map_err(|err| {
        protocol_violation(format!("invalid {} response payload: {}", label, err))
            .with_backend_id(ctx.backend_id.clone())
    })
}
