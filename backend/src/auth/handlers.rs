//! Handler functions for authentication-related API endpoints.
//!
//! These functions decode form fields, call into `auth::service` and map the
//! outcome onto HTTP responses.

use crate::api::common::{ApiError, ApiResponse, service_error_to_http};
use crate::auth::middleware::extract_bearer_token;
use crate::auth::models::*;
use crate::auth::service::AuthService;
use crate::errors::ServiceError;
use crate::state::AppState;
use axum::{
    extract::{Extension, Form},
    http::{HeaderMap, StatusCode},
    response::Json,
};

/// Handle user signup request
#[axum::debug_handler]
pub async fn signup(
    Extension(state): Extension<AppState>,
    Form(payload): Form<SignupRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserInfo>>), ApiError> {
    let user = AuthService::new(&state)
        .signup(payload)
        .await
        .map_err(service_error_to_http)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(user, "Signup successful")),
    ))
}

/// Handle user login request
#[axum::debug_handler]
pub async fn login(
    Extension(state): Extension<AppState>,
    Form(payload): Form<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    let session = AuthService::new(&state)
        .login(payload)
        .await
        .map_err(service_error_to_http)?;

    Ok(Json(ApiResponse::success(session, "Login successful")))
}

/// Handle token refresh request
#[axum::debug_handler]
pub async fn refresh_token(
    Extension(state): Extension<AppState>,
    Form(payload): Form<RefreshTokenRequest>,
) -> Result<Json<ApiResponse<RefreshTokenResponse>>, ApiError> {
    let refreshed = AuthService::new(&state)
        .refresh(payload)
        .await
        .map_err(service_error_to_http)?;

    Ok(Json(ApiResponse::success(refreshed, "Token refreshed")))
}

/// Handle logout request: revokes every session of the calling user
#[axum::debug_handler]
pub async fn logout(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let token = extract_bearer_token(&headers)
        .ok_or_else(|| service_error_to_http(ServiceError::Authentication))?;

    AuthService::new(&state)
        .logout(token)
        .await
        .map_err(service_error_to_http)?;

    Ok(Json(ApiResponse::success((), "Logged out successfully")))
}

/// Get current user information from the access token
#[axum::debug_handler]
pub async fn me(
    Extension(state): Extension<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<UserInfo>>, ApiError> {
    let info = AuthService::new(&state)
        .current_user(&user)
        .await
        .map_err(service_error_to_http)?;

    Ok(Json(ApiResponse::success(info, "User retrieved successfully")))
}
