use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;

use super::error::ApiError;
use crate::models::{AuthResponse, LoginRequest, ProfileUpdate, RegisterRequest, User};
use crate::AppState;

/// Bearer token taken from the `Authorization` header
pub struct BearerToken(pub String);

/// Extract the token from request headers
fn extract_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        extract_token(&parts.headers)
            .map(BearerToken)
            .ok_or_else(|| ApiError::unauthorized("Missing bearer token"))
    }
}

/// POST /api/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    Ok(Json(state.auth.login(request).await?))
}

/// POST /api/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let response = state.auth.register(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
) -> Result<StatusCode, ApiError> {
    state.auth.revoke(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/user
pub async fn current_user(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.auth.user_for_token(&token)?))
}

/// PUT /api/user/profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.auth.update_profile(&token, update).await?))
}
