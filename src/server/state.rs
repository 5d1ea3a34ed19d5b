use crate::auth::{AuthGateway, AuthSettings};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::router::TranslationRouter;
use crate::store::{open_store, CredentialStore};
use crate::translator::{HttpTranslator, Translator};
use crate::usage::{PlanLimits, UsageMeter};
use anyhow::{Context, Result};
use chrono::Duration;
use std::sync::Arc;
use tracing::info;

/// Shared handles for every request handler.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthGateway>,
    pub meter: Arc<UsageMeter>,
    pub router: Arc<TranslationRouter>,
}

impl AppState {
    /// Wire the core components around an existing store and translator.
    pub fn new(
        config: &Config,
        store: Arc<dyn CredentialStore>,
        translator: Arc<dyn Translator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let window = Duration::days(config.usage_window_days.max(1));

        let auth = AuthGateway::new(
            store.clone(),
            clock.clone(),
            AuthSettings {
                jwt_secret: config.jwt_secret.clone(),
                system_keys: config.system_api_keys.clone(),
                api_key_required: config.api_key_required,
                usage_window: window,
            },
        );

        let meter = UsageMeter::new(
            store,
            clock.clone(),
            PlanLimits {
                free: config.free_plan_limit,
                pro: config.pro_plan_limit,
            },
            window,
        );

        let router = TranslationRouter::new(
            translator,
            clock,
            std::time::Duration::from_secs(config.hop_timeout_secs.max(1)),
        );

        Self {
            auth: Arc::new(auth),
            meter: Arc::new(meter),
            router: Arc::new(router),
        }
    }

    /// Open the configured store and connect to the configured engine.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = open_store(config.store_backend, &config.store_path)
            .context("Failed to open credential store")?;
        info!(
            "Credential store ready ({:?} at {}, {} users)",
            config.store_backend,
            config.store_path,
            store.count().unwrap_or(0)
        );

        let client = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;
        let translator = HttpTranslator::new(client, &config.engine_url)
            .with_api_key(config.engine_api_key.clone())
            .with_load_only(config.load_only.clone());

        Ok(Self::new(
            config,
            store,
            Arc::new(translator),
            Arc::new(SystemClock),
        ))
    }
}
