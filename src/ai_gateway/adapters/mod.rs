use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use crate::ai_gateway::{
    error::GatewayError,
    types::{
        AdapterContext, BackendCapabilities, BackendDialect, BackendRawEvent, CanonicalRequest,
    },
};

pub mod http_common;
pub mod ollama;
pub mod openai_compatible;

#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn dialect(&self) -> BackendDialect;
    fn static_capabilities(&self) -> BackendCapabilities;

    /// Sends one request and returns the reply as ordered events, ending in
    /// `Completed` or `Failed`.
    async fn invoke(
        &self,
        ctx: AdapterContext,
        req: CanonicalRequest,
    ) -> Result<Vec<BackendRawEvent>, GatewayError>;
}

pub type AdapterRegistry = HashMap<BackendDialect, Arc<dyn BackendAdapter>>;

pub fn build_default_adapters() -> Result<AdapterRegistry, GatewayError> {
    let mut adapters: AdapterRegistry = HashMap::new();
    adapters.insert(
        BackendDialect::OpenAiCompatible,
        Arc::new(openai_compatible::OpenAiCompatibleAdapter::new()?),
    );
    adapters.insert(
        BackendDialect::Ollama,
        Arc::new(ollama::OllamaAdapter::new()?),
    );
    Ok(adapters)
}
