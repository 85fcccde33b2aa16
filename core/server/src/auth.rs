use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::error::ApiError;
use crate::routes::AppState;

/// Answers one question about a request: may it reach the API?
pub trait Authenticator: Send + Sync {
    fn is_authenticated(&self, headers: &HeaderMap) -> bool;
}

/// Accepts every request. Used when no token is configured.
pub struct AllowAll;

impl Authenticator for AllowAll {
    fn is_authenticated(&self, _headers: &HeaderMap) -> bool {
        true
    }
}

/// Accepts `Authorization: Bearer <token>` for one shared token.
pub struct BearerToken {
    token: String,
}

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl Authenticator for BearerToken {
    fn is_authenticated(&self, headers: &HeaderMap) -> bool {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|presented| presented.trim() == self.token)
            .unwrap_or(false)
    }
}

/// Middleware rejecting requests the configured authenticator does not accept
pub async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.auth.is_authenticated(request.headers()) {
        return next.run(request).await;
    }

    debug!("Rejected unauthenticated {} {}", request.method(), request.uri().path());
    ApiError::Unauthorized.into_response()
}
