// Module: http
// Router, shared state and handlers

pub mod download_proxy;
pub mod error;
pub mod health;

use std::sync::Arc;

use axum::Router;
use gramgrab_proxy::DownloadProxy;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{AppError, AppResult, ErrorResponse};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub proxy: Arc<DownloadProxy>,
}

/// Create the HTTP router with all routes
pub fn create_router(proxy: Arc<DownloadProxy>) -> Router {
    let state = AppState { proxy };

    Router::new()
        .merge(download_proxy::create_download_proxy_router())
        .merge(health::create_health_router())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
