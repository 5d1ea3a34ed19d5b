use super::middleware::SessionUser;
use super::run_blocking;
use super::state::AppState;
use crate::auth::Identity;
use crate::error::{GatewayError, GatewayResult};
use crate::i18n::{LanguageInfo, LanguageRegistry};
use crate::metrics::{GatewayMetrics, MetricsReport};
use crate::router::AUTO_SOURCE;
use crate::translator::{Detection, LanguagePair};
use crate::usage::UsageSnapshot;
use crate::user::{PublicUser, User};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> GatewayResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| GatewayError::BadRequest(rejection.body_text()))
}

fn required(field: &str, value: Option<String>) -> GatewayResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| GatewayError::BadRequest(format!("Missing required field: {}", field)))
}

// ==================== Engine-facing endpoints ====================

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn languages(State(state): State<AppState>) -> GatewayResult<Json<Vec<LanguageInfo>>> {
    let pairs = state.router.supported_pairs().await?;
    Ok(Json(LanguageRegistry::get().languages_from_pairs(&pairs)))
}

#[derive(Debug, Serialize)]
pub struct PackagesResponse {
    pub total_packages: usize,
    pub packages: Vec<LanguagePair>,
}

pub async fn packages(State(state): State<AppState>) -> GatewayResult<Json<PackagesResponse>> {
    let pairs = state.router.supported_pairs().await?;
    Ok(Json(PackagesResponse {
        total_packages: pairs.len(),
        packages: pairs,
    }))
}

#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    pub q: Option<String>,
    pub source: Option<String>,
    pub target: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateResponse {
    pub translated_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_language: Option<Detection>,
}

pub async fn translate(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<TranslateRequest>, JsonRejection>,
) -> GatewayResult<Json<TranslateResponse>> {
    let body = parse_body(payload)?;
    let text = body
        .q
        .ok_or_else(|| GatewayError::BadRequest("Missing required field: q".to_string()))?;
    let target = required("target", body.target)?;
    let source = body
        .source
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| AUTO_SOURCE.to_string());

    if let Some(format) = body.format.as_deref().filter(|f| *f != "text") {
        debug!("Format '{}' requested; input is translated as plain text", format);
    }

    let chars = text.chars().count() as u64;
    let metered = identity.metered_email().map(str::to_string);
    if let Some(email) = metered.clone() {
        let meter = state.meter.clone();
        run_blocking(move || meter.consume(&email, chars)).await?;
    }

    match state.router.translate(&text, &source, &target).await {
        Ok(routed) => Ok(Json(TranslateResponse {
            translated_text: routed.text,
            detected_language: routed.detected,
        })),
        Err(e) => {
            if let Some(email) = metered {
                let meter = state.meter.clone();
                let refunded = run_blocking({
                    let email = email.clone();
                    move || meter.refund(&email, chars)
                })
                .await;
                if let Err(refund_err) = refunded {
                    warn!("Failed to refund {} characters to {}: {}", chars, email, refund_err);
                }
            }
            Err(e)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DetectRequest {
    pub q: Option<String>,
}

pub async fn detect(
    State(state): State<AppState>,
    payload: Result<Json<DetectRequest>, JsonRejection>,
) -> GatewayResult<Json<Detection>> {
    let body = parse_body(payload)?;
    let text = body
        .q
        .ok_or_else(|| GatewayError::BadRequest("Missing required field: q".to_string()))?;
    Ok(Json(state.router.detect(&text).await?))
}

pub async fn metrics() -> Json<MetricsReport> {
    Json(GatewayMetrics::global().report())
}

// ==================== Account endpoints ====================

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: PublicUser,
    pub token: String,
}

impl AuthResponse {
    fn new(user: &User, token: String) -> Self {
        Self {
            user: PublicUser::from(user),
            token,
        }
    }
}

pub async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> GatewayResult<(StatusCode, Json<AuthResponse>)> {
    let body = parse_body(payload)?;
    let email = required("email", body.email)?;
    let password = required("password", body.password)?;
    let name = body.name.unwrap_or_default();

    let auth = state.auth.clone();
    let (user, token) = run_blocking(move || auth.signup(&email, &password, &name)).await?;
    Ok((StatusCode::CREATED, Json(AuthResponse::new(&user, token))))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> GatewayResult<Json<AuthResponse>> {
    let body = parse_body(payload)?;
    let email = required("email", body.email)?;
    let password = required("password", body.password)?;

    let auth = state.auth.clone();
    let (user, token) = run_blocking(move || auth.login(&email, &password)).await?;
    Ok(Json(AuthResponse::new(&user, token)))
}

/// Tokens are stateless; the client just drops its copy.
pub async fn logout() -> Json<Value> {
    Json(json!({ "success": true }))
}

pub async fn me(SessionUser(user): SessionUser) -> Json<PublicUser> {
    Json(PublicUser::from(&user))
}

pub async fn usage(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
) -> GatewayResult<Json<UsageSnapshot>> {
    let meter = state.meter.clone();
    let snapshot = run_blocking(move || meter.current_usage(&user.email)).await?;
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
pub struct UpgradeRequest {
    pub plan: Option<String>,
}

pub async fn upgrade(
    State(state): State<AppState>,
    SessionUser(user): SessionUser,
    payload: Result<Json<UpgradeRequest>, JsonRejection>,
) -> GatewayResult<Json<PublicUser>> {
    let body = parse_body(payload)?;
    let plan = required("plan", body.plan)?;
    let meter = state.meter.clone();
    let updated = run_blocking(move || meter.upgrade(&user.email, &plan)).await?;
    Ok(Json(PublicUser::from(&updated)))
}
