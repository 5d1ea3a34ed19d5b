use crate::store::StoreBackend;
use crate::usage::{DEFAULT_FREE_LIMIT, DEFAULT_PRO_LIMIT, DEFAULT_WINDOW_DAYS};
use anyhow::{Context, Result};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,

    // Translation engine
    pub engine_url: String,
    pub engine_api_key: Option<String>,
    pub load_only: Option<Vec<String>>,
    pub hop_timeout_secs: u64,

    // API keys
    pub api_key_required: bool,
    pub system_api_keys: Vec<String>,

    // Sessions
    pub jwt_secret: String,

    // Credential storage
    pub store_backend: StoreBackend,
    pub store_path: String,

    // Metering
    pub free_plan_limit: u64,
    pub pro_plan_limit: u64,
    pub usage_window_days: i64,
}

/// Comma-separated list, trimmed, empty entries dropped.
fn env_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .map(|v| {
            v.split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn env_bool(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = match env_optional("JWT_SECRET_KEY") {
            Some(secret) => secret,
            None => {
                warn!("JWT_SECRET_KEY not set, using a random secret; sessions will not survive a restart");
                crate::security::generate_api_key()
            }
        };

        let store_backend = std::env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "json".to_string())
            .parse()
            .context("Invalid STORE_BACKEND")?;

        let load_only = env_list("LOAD_ONLY");

        Ok(Self {
            // Server
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 5000),

            // Translation engine
            engine_url: std::env::var("ENGINE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:5001".to_string()),
            engine_api_key: env_optional("ENGINE_API_KEY"),
            load_only: if load_only.is_empty() {
                None
            } else {
                Some(load_only)
            },
            hop_timeout_secs: env_parse("HOP_TIMEOUT_SECS", 30),

            // API keys
            api_key_required: env_bool("API_KEY_REQUIRED"),
            system_api_keys: env_list("API_KEYS"),

            // Sessions
            jwt_secret,

            // Credential storage
            store_backend,
            store_path: std::env::var("STORE_PATH").unwrap_or_else(|_| "users.json".to_string()),

            // Metering
            free_plan_limit: env_parse("FREE_PLAN_LIMIT", DEFAULT_FREE_LIMIT),
            pro_plan_limit: env_parse("PRO_PLAN_LIMIT", DEFAULT_PRO_LIMIT),
            usage_window_days: env_parse("USAGE_WINDOW_DAYS", DEFAULT_WINDOW_DAYS),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
