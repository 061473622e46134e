use std::collections::BTreeMap;

use async_trait::async_trait;

use encounter_docgen::ai_gateway::{
    credentials::CredentialProvider,
    error::GatewayError,
    types::{
        AIGatewayConfig, BackendCapabilities, BackendDialect, BackendProfile, BudgetConfig,
        CanonicalLimits, CanonicalRequest, ChatMessage, ChatRequest, CredentialRef, OutputMode,
        ReliabilityConfig, RequestLimitOverrides, ResolvedCredential,
    },
};

#[derive(Default)]
pub struct StaticCredentialProvider;

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn resolve(
        &self,
        _reference: &CredentialRef,
        _backend: &BackendProfile,
    ) -> Result<ResolvedCredential, GatewayError> {
        Ok(ResolvedCredential::none())
    }
}

pub fn backend(id: &str, dialect: BackendDialect, model: &str) -> BackendProfile {
    BackendProfile {
        id: id.to_string(),
        dialect,
        endpoint: Some("https://example.invalid/v1".to_string()),
        credential: CredentialRef::None,
        default_model: model.to_string(),
        capabilities: Some(BackendCapabilities { json_mode: true }),
    }
}

pub fn gateway_config() -> AIGatewayConfig {
    AIGatewayConfig {
        default_backend: "openai-default".to_string(),
        backends: vec![backend(
            "openai-default",
            BackendDialect::OpenAiCompatible,
            "m1",
        )],
        reliability: ReliabilityConfig {
            max_retries: 2,
            backoff_base_ms: 1,
            backoff_max_ms: 2,
            breaker_failure_threshold: 100,
            breaker_open_ms: 1000,
        },
        budget: BudgetConfig::default(),
    }
}

pub fn chat_request(output_mode: OutputMode) -> ChatRequest {
    let mut metadata = BTreeMap::new();
    metadata.insert("stage".to_string(), "document_predictor".to_string());
    metadata.insert("encounter_id".to_string(), "E1".to_string());
    ChatRequest {
        request_id: None,
        backend_id: Some("openai-default".to_string()),
        model: None,
        messages: vec![
            ChatMessage::system("You predict clinical documents."),
            ChatMessage::user("Encounter narrative"),
        ],
        output_mode,
        temperature: Some(1.0),
        limits: RequestLimitOverrides {
            max_output_tokens: Some(16_000),
            max_request_time_ms: None,
        },
        metadata,
    }
}

pub fn canonical_request(
    backend_hint: Option<&str>,
    max_output_tokens: Option<u64>,
) -> CanonicalRequest {
    CanonicalRequest {
        request_id: "req".to_string(),
        backend_hint: backend_hint.map(str::to_string),
        model_override: None,
        messages: vec![ChatMessage::user("hello")],
        output_mode: OutputMode::Text,
        temperature: None,
        limits: CanonicalLimits {
            max_output_tokens,
            max_request_time_ms: None,
        },
        metadata: BTreeMap::new(),
    }
}
