use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

use crate::ai_gateway::error::GatewayError;

pub type BackendId = String;
pub type RequestId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BackendDialect {
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible,
    #[serde(rename = "ollama")]
    Ollama,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendCapabilities {
    #[serde(default)]
    pub json_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialRef {
    Env { var: String },
    InlineToken { token: String },
    None,
}

#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    pub auth_header: Option<String>,
    pub extra_headers: Vec<(String, String)>,
}

impl ResolvedCredential {
    pub fn none() -> Self {
        Self {
            auth_header: None,
            extra_headers: Vec::new(),
        }
    }

    pub fn bearer(token: &str) -> Self {
        Self {
            auth_header: Some(format!("Bearer {}", token)),
            extra_headers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendProfile {
    pub id: BackendId,
    pub dialect: BackendDialect,
    pub endpoint: Option<String>,
    pub credential: CredentialRef,
    pub default_model: String,
    #[serde(default)]
    pub capabilities: Option<BackendCapabilities>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_breaker_failure_threshold")]
    pub breaker_failure_threshold: u32,
    #[serde(default = "default_breaker_open_ms")]
    pub breaker_open_ms: u64,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            breaker_failure_threshold: default_breaker_failure_threshold(),
            breaker_open_ms: default_breaker_open_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_max_request_time_ms")]
    pub max_request_time_ms: u64,
    #[serde(default)]
    pub max_usage_tokens_per_request: Option<u64>,
    #[serde(default = "default_max_concurrency_per_backend")]
    pub max_concurrency_per_backend: u32,
    #[serde(default)]
    pub rate_smoothing_per_second: Option<u32>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_request_time_ms: default_max_request_time_ms(),
            max_usage_tokens_per_request: None,
            max_concurrency_per_backend: default_max_concurrency_per_backend(),
            rate_smoothing_per_second: None,
        }
    }
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_base_ms() -> u64 {
    200
}

fn default_backoff_max_ms() -> u64 {
    2_000
}

fn default_breaker_failure_threshold() -> u32 {
    5
}

fn default_breaker_open_ms() -> u64 {
    15_000
}

// Long-form documents at 16k output tokens routinely take minutes.
fn default_max_request_time_ms() -> u64 {
    300_000
}

fn default_max_concurrency_per_backend() -> u32 {
    8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIGatewayConfig {
    pub default_backend: BackendId,
    pub backends: Vec<BackendProfile>,
    #[serde(default)]
    pub reliability: ReliabilityConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    Text,
    JsonObject,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestLimitOverrides {
    #[serde(default)]
    pub max_output_tokens: Option<u64>,
    #[serde(default)]
    pub max_request_time_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub backend_id: Option<BackendId>,
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default = "default_output_mode")]
    pub output_mode: OutputMode,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub limits: RequestLimitOverrides,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

fn default_output_mode() -> OutputMode {
    OutputMode::Text
}

#[derive(Debug, Clone)]
pub struct CanonicalRequest {
    pub request_id: RequestId,
    pub backend_hint: Option<BackendId>,
    pub model_override: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub output_mode: OutputMode,
    pub temperature: Option<f64>,
    pub limits: CanonicalLimits,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct CanonicalLimits {
    pub max_output_tokens: Option<u64>,
    pub max_request_time_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    Other(String),
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub request_id: RequestId,
    pub backend_id: BackendId,
    pub model: String,
    pub output_text: String,
    pub usage: Option<UsageStats>,
    pub finish_reason: FinishReason,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub enum BackendRawEvent {
    OutputTextDelta { delta: String },
    Usage { usage: UsageStats },
    Completed { finish_reason: FinishReason },
    Failed { error: GatewayError },
}

#[derive(Debug, Clone)]
pub struct AdapterContext {
    pub backend_id: BackendId,
    pub model: String,
    pub profile: BackendProfile,
    pub credential: ResolvedCredential,
    pub timeout: Duration,
    pub request_id: RequestId,
}
