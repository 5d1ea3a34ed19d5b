use anyhow::{Context, Result};
use tracing::{info, warn};
use translation_gateway::{config::Config, server};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("translation_gateway=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!("Starting translation gateway");

    // Load configuration from environment
    let config = Config::from_env()?;
    info!(
        "Configuration: engine={}, store={:?}, api_key_required={}",
        config.engine_url, config.store_backend, config.api_key_required
    );
    if let Some(languages) = &config.load_only {
        info!("Restricting language pairs to: {}", languages.join(", "));
    }
    if config.api_key_required && config.system_api_keys.is_empty() {
        warn!("API_KEY_REQUIRED is set but API_KEYS is empty; only user keys will be accepted");
    }

    let state = server::AppState::from_config(&config)?;

    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address()))?;

    server::serve(listener, state).await?;

    info!("Translation gateway stopped");
    Ok(())
}
