//! Top-level HTTP surface: the router assembly and shared response types.

pub mod common;

use crate::api::common::ApiResponse;
use crate::auth;
use crate::state::AppState;
use axum::{Extension, Router, response::Json, routing::get};

/// Builds the full application router around the shared state.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .nest("/auth", auth::routes::auth_router())
        .layer(Extension(state))
}

async fn root_handler() -> Json<ApiResponse<serde_json::Value>> {
    Json(ApiResponse::success(
        serde_json::json!({
            "service": "authgate",
            "version": env!("CARGO_PKG_VERSION")
        }),
        "Welcome to the authgate API",
    ))
}
