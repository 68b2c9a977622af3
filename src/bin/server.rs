//! OmniPA Shopping Server
//!
//! The remote store for OmniPA shopping lists. Clients queue changes while
//! offline and replay them here when they reconnect.
//!
//! # Configuration
//!
//! Environment variables:
//! - `OMNIPA_PORT`: Port to listen on (default: 8080)
//! - `OMNIPA_DATABASE_PATH`: SQLite database file (default: ~/.local/share/omnipa-server/omnipa.db)
//! - `OMNIPA_CONFIG`: Path to config file (default: ~/.config/omnipa-server/config.yaml)
//!
//! # Config File Format
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     user_id: "user1"
//! ```

use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use omnipa_server::config::{ApiKeyStore, Config};
use omnipa_server::db::{init_db, ListRepository};
use omnipa_server::server::{router, AppState};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "omnipa_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    tracing::info!("Database: {}", config.database_path.display());
    tracing::info!("Config file: {}", config.config_path.display());

    let pool = init_db(&config.database_path)
        .await
        .map_err(|e| format!("Failed to open database: {}", e))?;

    // Load API keys
    let api_keys = ApiKeyStore::load(&config.config_path);

    let app = router(AppState::new(api_keys, ListRepository::new(pool)));

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
