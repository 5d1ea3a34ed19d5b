use super::run_blocking;
use super::state::AppState;
use crate::error::GatewayError;
use crate::user::User;
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Resolve `X-API-Key` into an [`Identity`](crate::auth::Identity) and attach
/// it to the request, or reject according to the key policy.
pub async fn api_key_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    let auth = state.auth.clone();
    match run_blocking(move || auth.authenticate(provided.as_deref())).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Account behind `Authorization: Bearer <token>`.
pub struct SessionUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for SessionUser {
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(GatewayError::InvalidToken)?
            .to_string();

        let auth = state.auth.clone();
        run_blocking(move || auth.user_for_token(&token))
            .await
            .map(SessionUser)
    }
}
