//! Auto-combat client binary.
//!
//! Composition root: loads configuration, installs logging, builds the
//! runtime with the network transports, and runs until Ctrl-C.
//!
//! ```bash
//! COMBAT_API_URL=https://game.example.com/api \
//! COMBAT_WS_URL=wss://ws.example.com COMBAT_APP_KEY=... \
//! COMBAT_API_TOKEN=... COMBAT_CHARACTER_ID=42 cargo run -p combat-client
//! ```

use anyhow::Result;

use combat_client::{ClientBuilder, ClientConfig, logging};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // 1. Load configuration from environment
    let config = ClientConfig::from_env()?;

    // 2. Setup logging
    let _guard = logging::setup_logging(config.log_dir.as_deref())?;

    tracing::info!("Starting auto-combat client");
    tracing::info!("API: {}", config.transport.api_url);
    tracing::info!("Push: {}", config.enable_push);
    tracing::info!("Poll interval: {:?}", config.runtime.poll_interval);

    // 3. Build client (runtime + transports)
    let client = ClientBuilder::from_config(config)?.build()?;

    // 4. Run until interrupted
    client
        .run(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::error!("Ctrl-C handler failed: {}", error);
            }
            tracing::info!("Interrupted, shutting down");
        })
        .await
}
