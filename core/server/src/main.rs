use anyhow::{Context, Result};
use clap::Parser;
use knowledge_base_server::{router, AppState, Config};
use knowledge_base_store::Database;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();

    info!("Knowledge Base Service v{}", env!("CARGO_PKG_VERSION"));

    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }
    }

    let db = Database::new(&config.db_path)
        .with_context(|| format!("opening database {}", config.db_path.display()))?;
    info!("Database initialized at: {}", config.db_path.display());

    if config.api_token.as_deref().map_or(true, |t| t.trim().is_empty()) {
        warn!("No API token configured; all API routes are open");
    }

    let state = AppState::new(db, config.cache_ttl(), config.authenticator());
    let app = router(state);

    info!("Starting HTTP server on http://{}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
