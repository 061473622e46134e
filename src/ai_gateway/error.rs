use thiserror::Error;

use crate::ai_gateway::types::BackendId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    InvalidRequest,
    Authentication,
    Authorization,
    RateLimited,
    Timeout,
    CircuitOpen,
    BudgetExceeded,
    BackendTransient,
    BackendPermanent,
    ProtocolViolation,
    Internal,
}

impl GatewayErrorKind {
    /// Kinds a later attempt may clear. Only these count toward a backend's
    /// circuit breaker.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            GatewayErrorKind::RateLimited
                | GatewayErrorKind::Timeout
                | GatewayErrorKind::BackendTransient
        )
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}{}", origin(.backend_id, .provider_http_status))]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
    pub retryable: bool,
    pub backend_id: Option<BackendId>,
    pub provider_http_status: Option<u16>,
}

fn origin(backend_id: &Option<BackendId>, status: &Option<u16>) -> String {
    match (backend_id, status) {
        (Some(backend_id), Some(status)) => {
            format!(" (backend={}, http_status={})", backend_id, status)
        }
        (Some(backend_id), None) => format!(" (backend={})", backend_id),
        (None, Some(status)) => format!(" (http_status={})", status),
        (None, None) => String::new(),
    }
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.is_transient(),
            backend_id: None,
            provider_http_status: None,
        }
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Keeps the first backend id attached; adapters and the gateway both
    /// tag errors on the way out.
    pub fn with_backend_id(mut self, backend_id: impl Into<String>) -> Self {
        self.backend_id.get_or_insert_with(|| backend_id.into());
        self
    }

    pub fn with_provider_http_status(mut self, status: u16) -> Self {
        self.provider_http_status = Some(status);
        self
    }
}

pub fn invalid_request(message: impl Into<String>) -> GatewayError {
    GatewayError::new(GatewayErrorKind::InvalidRequest, message)
}

pub fn protocol_violation(message: impl Into<String>) -> GatewayError {
    GatewayError::new(GatewayErrorKind::ProtocolViolation, message)
}

pub fn internal_error(message: impl Into<String>) -> GatewayError {
    GatewayError::new(GatewayErrorKind::Internal, message)
}
