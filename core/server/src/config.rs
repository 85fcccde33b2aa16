use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AllowAll, Authenticator, BearerToken};

/// Service configuration, from flags or the matching environment variables
#[derive(Parser, Clone)]
#[command(name = "knowledge-base")]
#[command(about = "Self-hosted knowledge base: categories, articles, tags")]
pub struct Config {
    /// Path to SQLite database file
    #[arg(long, env = "KB_DB_PATH", default_value = "knowledge-base.db")]
    pub db_path: PathBuf,

    /// Address the HTTP server listens on
    #[arg(long, env = "KB_BIND", default_value = "127.0.0.1:8787")]
    pub bind: SocketAddr,

    /// Bearer token required on API routes; without it every request is accepted
    #[arg(long, env = "KB_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Seconds a materialized category forest is served from memory (0 disables)
    #[arg(long, env = "KB_CACHE_TTL_SECS", default_value_t = 30)]
    pub cache_ttl_secs: u64,
}

impl Config {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn authenticator(&self) -> Arc<dyn Authenticator> {
        match self.api_token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => Arc::new(BearerToken::new(token)),
            None => Arc::new(AllowAll),
        }
    }
}
