use std::env;

use async_trait::async_trait;

use crate::ai_gateway::{
    error::{GatewayError, GatewayErrorKind, invalid_request},
    types::{BackendProfile, CredentialRef, ResolvedCredential},
};

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn resolve(
        &self,
        reference: &CredentialRef,
        backend: &BackendProfile,
    ) -> Result<ResolvedCredential, GatewayError>;
}

/// Resolves `env` references from the process environment (populated from
/// `.env` at start-up) and passes inline tokens through.
#[derive(Default)]
pub struct EnvCredentialProvider;

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn resolve(
        &self,
        reference: &CredentialRef,
        backend: &BackendProfile,
    ) -> Result<ResolvedCredential, GatewayError> {
        match reference {
            CredentialRef::Env { var } => {
                let token = env::var(var)
                    .ok()
                    .map(|token| token.trim().to_string())
                    .filter(|token| !token.is_empty())
                    .ok_or_else(|| {
                        GatewayError::new(
                            GatewayErrorKind::Authentication,
                            format!(
                                "credential environment variable {} is unset or empty for backend {}",
                                var, backend.id
                            ),
                        )
                        .with_retryable(false)
                        .with_backend_id(backend.id.clone())
                    })?;
                Ok(ResolvedCredential::bearer(&token))
            }
            CredentialRef::InlineToken { token } => {
                let token = token.trim();
                if token.is_empty() {
                    return Err(invalid_request(format!(
                        "inline credential token for backend {} cannot be empty",
                        backend.id
                    )));
                }
                Ok(ResolvedCredential::bearer(token))
            }
            CredentialRef::None => Ok(ResolvedCredential::none()),
        }
    }
}
