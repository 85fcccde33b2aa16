pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod routes;

pub use auth::{AllowAll, Authenticator, BearerToken};
pub use cache::ForestCache;
pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::{router, AppState};
