use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Every failure the gateway can report to a caller.
///
/// All variants are recoverable at the request boundary; `IntoResponse`
/// maps each one to a client-facing status code.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("User already exists")]
    AlreadyExists,

    /// Same message for an unknown email and a wrong password.
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid plan: '{0}'. Expected one of: free, pro, enterprise")]
    InvalidPlan(String),

    #[error("Usage limit exceeded. Your plan allows {limit} characters per month")]
    QuotaExceeded { limit: u64 },

    #[error("{}", no_path_message(.from, .to, .available))]
    NoTranslationPath {
        from: String,
        to: String,
        available: Vec<String>,
    },

    #[error("Translation engine error: {0}")]
    Engine(String),

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("API key required")]
    MissingApiKey,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("User not found")]
    UserNotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// Wrap any backend failure (database, filesystem, serialization).
    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        Self::Storage(err.to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::AlreadyExists => StatusCode::CONFLICT,
            GatewayError::InvalidCredentials
            | GatewayError::InvalidToken
            | GatewayError::MissingApiKey => StatusCode::UNAUTHORIZED,
            GatewayError::InvalidApiKey => StatusCode::FORBIDDEN,
            GatewayError::InvalidPlan(_)
            | GatewayError::NoTranslationPath { .. }
            | GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Engine(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UserNotFound => StatusCode::NOT_FOUND,
            GatewayError::Storage(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Targets that no standard engine package covers.
const COMMUNITY_MODEL_LANGUAGES: &[(&str, &str)] = &[
    ("cy", "Welsh"),
    ("gd", "Scottish Gaelic"),
    ("kw", "Cornish"),
    ("gv", "Manx"),
];

fn no_path_message(from: &str, to: &str, available: &[String]) -> String {
    let mut message = format!(
        "Translation failed: No translation model available for '{}' -> '{}'",
        from, to
    );
    if available.is_empty() {
        message.push_str(". No translation models are installed");
    } else {
        message.push_str(&format!(
            ". Available languages: {}. Use GET /languages to see all supported languages",
            available.join(", ")
        ));
    }
    if let Some((code, name)) = COMMUNITY_MODEL_LANGUAGES
        .iter()
        .find(|(code, _)| *code == to)
    {
        message.push_str(&format!(
            ". Note: {} ({}) requires a community model",
            name, code
        ));
    }
    message
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = if status.is_server_error() && !matches!(self, GatewayError::Engine(_)) {
            tracing::error!("Request failed: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_message_includes_limit() {
        let err = GatewayError::QuotaExceeded { limit: 10_000 };
        assert!(err.to_string().contains("10000"));
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_no_path_message_lists_languages() {
        let err = GatewayError::NoTranslationPath {
            from: "en".to_string(),
            to: "cy".to_string(),
            available: vec!["de".to_string(), "en".to_string(), "es".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("'en' -> 'cy'"));
        assert!(message.contains("Available languages: de, en, es"));
    }

    #[test]
    fn test_no_path_message_without_models() {
        let err = GatewayError::NoTranslationPath {
            from: "en".to_string(),
            to: "fr".to_string(),
            available: vec![],
        };
        assert!(err.to_string().contains("No translation models are installed"));
        assert!(!err.to_string().contains("community model"));
    }

    #[test]
    fn test_no_path_message_notes_community_models() {
        let err = GatewayError::NoTranslationPath {
            from: "en".to_string(),
            to: "gd".to_string(),
            available: vec!["en".to_string(), "es".to_string()],
        };
        assert!(err
            .to_string()
            .ends_with("Note: Scottish Gaelic (gd) requires a community model"));
    }

    #[test]
    fn test_auth_status_codes() {
        assert_eq!(GatewayError::MissingApiKey.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(GatewayError::InvalidApiKey.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(GatewayError::InvalidToken.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(GatewayError::AlreadyExists.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_storage_errors_are_not_leaked() {
        let response = GatewayError::storage("disk on fire").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
