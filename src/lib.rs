//! Retrace - limit-up retracement screener with resumable background jobs

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod sources;
pub mod types;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use services::{ScreenController, TaskStore};
use sources::MarketDataProvider;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub controller: Arc<ScreenController>,
    pub store: Arc<TaskStore>,
    pub provider: Arc<dyn MarketDataProvider>,
}

impl AppState {
    /// Wire the controller to the given provider and store.
    pub fn new(config: Config, provider: Arc<dyn MarketDataProvider>, store: Arc<TaskStore>) -> Self {
        let controller = ScreenController::new(provider.clone(), store.clone(), config.scan.clone());
        Self {
            config: Arc::new(config),
            controller,
            store,
            provider,
        }
    }
}

/// Build the HTTP application.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub use error::{AppError, Result};
pub use types::*;
