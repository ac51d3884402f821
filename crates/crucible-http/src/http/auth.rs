use axum::http::HeaderMap;

use crucible_engine::rate_limiter::RateSpec;

use super::{AppError, AppState};

/// The identity behind a bearer token: the unit of rate limiting.
#[derive(Debug, Clone)]
pub(in crate::http) struct Tenant {
    pub(in crate::http) token: String,
    pub(in crate::http) label: String,
    pub(in crate::http) rate: Option<RateSpec>,
}

/// Resolve `Authorization: Bearer <token>` against the configured API keys.
pub(in crate::http) fn require_tenant(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Tenant, AppError> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::unauthorized("unauthorized", "Missing bearer token"))?;

    let key = state
        .config
        .api_keys
        .iter()
        .find(|key| key.token == token)
        .ok_or_else(|| AppError::unauthorized("unauthorized", "Unknown bearer token"))?;

    let rate = match (key.rps, key.burst) {
        (None, None) => None,
        (rps, burst) => Some(RateSpec {
            rps: rps.unwrap_or(state.config.default_rps),
            burst: burst.unwrap_or(state.config.default_burst),
        }),
    };

    Ok(Tenant {
        token: key.token.clone(),
        label: key.label.clone(),
        rate,
    })
}

/// Per-tenant admission gate in front of the orchestrator.
pub(in crate::http) fn admit(state: &AppState, tenant: &Tenant) -> Result<(), AppError> {
    state
        .limiter
        .admit(&tenant.token, &tenant.label, tenant.rate)?;
    Ok(())
}
