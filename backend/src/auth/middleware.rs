//! Middleware for protecting authenticated routes.
//!
//! Validates the bearer token on every request to a protected route and
//! attaches the resolved [`AuthenticatedUser`] to the request extensions.

use crate::auth::models::AuthenticatedUser;
use crate::auth::service::AuthService;
use crate::errors::ServiceError;
use crate::state::AppState;
use axum::{
    extract::{Extension, FromRequestParts, Request},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};

/// Pulls the token out of an `Authorization: Bearer <token>` header.
///
/// Returns `None` when the header is missing, uses another scheme, or the
/// token part is empty or contains whitespace.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth_header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = auth_header.strip_prefix("Bearer ")?;

    if token.is_empty() || token.chars().any(char::is_whitespace) {
        return None;
    }
    Some(token)
}

/// Access-token authentication middleware
pub async fn require_access_token(
    Extension(state): Extension<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_bearer_token(request.headers())
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_owned();

    let result = AuthService::new(&state).authenticate(&token).await;
    match result {
        Ok(user) => {
            request.extensions_mut().insert(user);
            Ok(next.run(request).await)
        }
        Err(ServiceError::Authentication) => Err(StatusCode::UNAUTHORIZED),
        Err(e) => {
            tracing::error!("Token validation failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Lets protected handlers take `AuthenticatedUser` as an argument.
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}
