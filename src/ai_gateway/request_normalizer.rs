use std::collections::BTreeMap;

use uuid::Uuid;

use crate::ai_gateway::{
    error::{GatewayError, invalid_request},
    types::{CanonicalLimits, CanonicalRequest, ChatRequest, ChatRole},
};

#[derive(Default, Clone, Copy)]
pub struct RequestNormalizer;

impl RequestNormalizer {
    pub fn normalize(&self, request: ChatRequest) -> Result<CanonicalRequest, GatewayError> {
        if request.messages.is_empty() {
            return Err(invalid_request("messages must not be empty"));
        }

        if request
            .messages
            .iter()
            .any(|message| message.content.trim().is_empty())
        {
            return Err(invalid_request("message content must not be blank"));
        }

        if let Some(index) = request
            .messages
            .iter()
            .skip_while(|message| message.role == ChatRole::System)
            .position(|message| message.role == ChatRole::System)
        {
            return Err(invalid_request(format!(
                "system messages must lead the conversation (found one after message {})",
                index
            )));
        }

        if !request
            .messages
            .iter()
            .any(|message| message.role == ChatRole::User)
        {
            return Err(invalid_request("at least one user message is required"));
        }

        if let Some(temperature) = request.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(invalid_request(format!(
                    "temperature {} is outside 0.0..=2.0",
                    temperature
                )));
            }
        }

        if request.limits.max_output_tokens == Some(0) {
            return Err(invalid_request("max_output_tokens must be positive"));
        }

        let request_id = request
            .request_id
            .unwrap_or_else(|| Uuid::now_v7().to_string());

        Ok(CanonicalRequest {
            request_id,
            backend_hint: request.backend_id,
            model_override: request.model,
            messages: request.messages,
            output_mode: request.output_mode,
            temperature: request.temperature,
            limits: CanonicalLimits {
                max_output_tokens: request.limits.max_output_tokens,
                max_request_time_ms: request.limits.max_request_time_ms,
            },
            metadata: request.metadata,
        })
    }
}

pub fn redact_metadata(metadata: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    metadata
        .iter()
        .map(|(key, value)| {
            let lowered = key.to_ascii_lowercase();
            let redacted = if lowered.contains("token") || lowered.contains("key") {
                "<redacted>".to_string()
            } else {
                value.clone()
            };
            (key.clone(), redacted)
        })
        .collect()
}
