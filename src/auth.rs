//! Accounts, session tokens and API-key policy.

use crate::clock::Clock;
use crate::error::{GatewayError, GatewayResult};
use crate::security::{
    constant_time_compare, dummy_password_hash, generate_api_key, hash_password, verify_password,
};
use crate::store::CredentialStore;
use crate::user::{Plan, UsageWindow, User};
use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const TOKEN_TTL_DAYS: i64 = 30;

/// Session token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub email: String,
    /// Expiry as a unix timestamp
    pub exp: i64,
}

/// What an API key turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiKeyMatch {
    System,
    User(User),
    Unknown,
}

/// Who is calling a key-protected endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// No key (or an unrecognized key) while keys are optional. Not metered.
    Anonymous,
    /// Operator key from configuration. Not metered.
    System,
    /// Metered against this user's plan.
    User(User),
}

impl Identity {
    /// Email to charge, if this caller is metered.
    pub fn metered_email(&self) -> Option<&str> {
        match self {
            Identity::User(user) => Some(&user.email),
            Identity::Anonymous | Identity::System => None,
        }
    }
}

/// Settings the gateway needs beyond its collaborators.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub system_keys: Vec<String>,
    pub api_key_required: bool,
    pub usage_window: Duration,
}

pub struct AuthGateway {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    system_keys: Vec<String>,
    api_key_required: bool,
    usage_window: Duration,
}

impl AuthGateway {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        settings: AuthSettings,
    ) -> Self {
        let system_keys: Vec<String> = settings
            .system_keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        // Warm the hash `login` verifies against for unknown emails
        dummy_password_hash();

        Self {
            store,
            clock,
            encoding_key: EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
            system_keys,
            api_key_required: settings.api_key_required,
            usage_window: settings.usage_window,
        }
    }

    /// Register a free-plan account and log it in.
    pub fn signup(&self, email: &str, password: &str, name: &str) -> GatewayResult<(User, String)> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(GatewayError::BadRequest(
                "Email and password are required".to_string(),
            ));
        }

        let password_hash = hash_password(password)
            .map_err(|e| GatewayError::Internal(format!("failed to hash password: {}", e)))?;

        let now = self.clock.now();
        let user = self.store.create(User {
            email: email.to_string(),
            name: name.to_string(),
            password_hash,
            plan: Plan::Free,
            api_key: generate_api_key(),
            created_at: now,
            usage: UsageWindow::starting_at(now, self.usage_window),
        })?;

        info!("Registered new user {}", user.email);
        let token = self.issue_token(&user)?;
        Ok((user, token))
    }

    pub fn login(&self, email: &str, password: &str) -> GatewayResult<(User, String)> {
        let user = match self.store.find(email)? {
            Some(user) => user,
            None => {
                // Keep the response time independent of whether the email exists
                let _ = verify_password(password, dummy_password_hash());
                debug!("Login attempt for unknown email");
                return Err(GatewayError::InvalidCredentials);
            }
        };

        if !verify_password(password, &user.password_hash) {
            debug!("Login attempt with wrong password for {}", email);
            return Err(GatewayError::InvalidCredentials);
        }

        let token = self.issue_token(&user)?;
        Ok((user, token))
    }

    pub fn issue_token(&self, user: &User) -> GatewayResult<String> {
        let claims = Claims {
            email: user.email.clone(),
            exp: (self.clock.now() + Duration::days(TOKEN_TTL_DAYS)).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| GatewayError::Internal(format!("failed to sign token: {}", e)))
    }

    /// Email carried by a valid, unexpired token.
    pub fn verify_token(&self, token: &str) -> Option<String> {
        // Expiry is checked against the injected clock below
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        let data = decode::<Claims>(token, &self.decoding_key, &validation).ok()?;
        if data.claims.exp <= self.clock.now().timestamp() {
            return None;
        }
        Some(data.claims.email)
    }

    /// Resolve a bearer token to the current stored record.
    pub fn user_for_token(&self, token: &str) -> GatewayResult<User> {
        let email = self.verify_token(token).ok_or(GatewayError::InvalidToken)?;
        self.store.find(&email)?.ok_or(GatewayError::InvalidToken)
    }

    pub fn resolve_api_key(&self, key: &str) -> GatewayResult<ApiKeyMatch> {
        if key.is_empty() {
            return Ok(ApiKeyMatch::Unknown);
        }
        if self
            .system_keys
            .iter()
            .any(|system| constant_time_compare(system, key))
        {
            return Ok(ApiKeyMatch::System);
        }
        Ok(match self.store.find_by_api_key(key)? {
            Some(user) => ApiKeyMatch::User(user),
            None => ApiKeyMatch::Unknown,
        })
    }

    /// Apply the API-key policy to an optional `X-API-Key` value.
    pub fn authenticate(&self, provided: Option<&str>) -> GatewayResult<Identity> {
        let key = provided.map(str::trim).filter(|k| !k.is_empty());

        let Some(key) = key else {
            return if self.api_key_required {
                Err(GatewayError::MissingApiKey)
            } else {
                Ok(Identity::Anonymous)
            };
        };

        match self.resolve_api_key(key)? {
            ApiKeyMatch::System => Ok(Identity::System),
            ApiKeyMatch::User(user) => Ok(Identity::User(user)),
            ApiKeyMatch::Unknown if self.api_key_required => {
                warn!("Rejected request with unknown API key");
                Err(GatewayError::InvalidApiKey)
            }
            ApiKeyMatch::Unknown => Ok(Identity::Anonymous),
        }
    }
}
