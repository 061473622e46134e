use std::collections::BTreeMap;

use crate::ai_gateway::{
    error::{GatewayError, invalid_request},
    types::{AIGatewayConfig, BackendId, BackendProfile, CanonicalRequest},
};

/// Static routing table built once from `ai_gateway.backends`.
#[derive(Clone)]
pub struct BackendRouter {
    default_backend: BackendId,
    routes: BTreeMap<BackendId, BackendProfile>,
}

#[derive(Debug, Clone)]
pub struct SelectedBackend {
    pub backend_id: BackendId,
    pub profile: BackendProfile,
    pub resolved_model: String,
}

impl BackendRouter {
    pub fn new(config: &AIGatewayConfig) -> Result<Self, GatewayError> {
        if config.backends.is_empty() {
            return Err(invalid_request("ai_gateway.backends must not be empty"));
        }

        let mut routes = BTreeMap::new();
        for profile in &config.backends {
            check_profile(profile)?;
            if routes.contains_key(&profile.id) {
                return Err(invalid_request(format!(
                    "duplicate backend id '{}' in ai_gateway.backends",
                    profile.id
                )));
            }
            routes.insert(profile.id.clone(), profile.clone());
        }

        if !routes.contains_key(&config.default_backend) {
            return Err(invalid_request(format!(
                "ai_gateway.default_backend '{}' does not exist",
                config.default_backend
            )));
        }

        Ok(Self {
            default_backend: config.default_backend.clone(),
            routes,
        })
    }

    /// A stage's backend hint wins over the default backend, and its model
    /// override wins over the backend's default model. A hint naming an
    /// unknown backend is an error, never a silent fallback.
    pub fn select(&self, req: &CanonicalRequest) -> Result<SelectedBackend, GatewayError> {
        let backend_id = req
            .backend_hint
            .as_deref()
            .map(str::trim)
            .filter(|hint| !hint.is_empty())
            .unwrap_or(self.default_backend.as_str())
            .to_string();

        let Some(profile) = self.routes.get(&backend_id) else {
            return Err(invalid_request(format!(
                "selected backend '{}' does not exist",
                backend_id
            )));
        };

        let resolved_model = match req.model_override.as_deref().map(str::trim) {
            Some(model) if !model.is_empty() => model.to_string(),
            _ => profile.default_model.clone(),
        };

        Ok(SelectedBackend {
            backend_id,
            profile: profile.clone(),
            resolved_model,
        })
    }
}

fn check_profile(profile: &BackendProfile) -> Result<(), GatewayError> {
    if profile.id.trim().is_empty() {
        return Err(invalid_request("backend id must not be empty"));
    }
    if profile.default_model.trim().is_empty() {
        return Err(invalid_request(format!(
            "backend '{}' must declare a default_model",
            profile.id
        )));
    }
    let has_endpoint = profile
        .endpoint
        .as_deref()
        .is_some_and(|endpoint| !endpoint.trim().is_empty());
    if !has_endpoint {
        return Err(invalid_request(format!(
            "backend '{}' must declare an endpoint",
            profile.id
        )));
    }
    Ok(())
}
