pub mod health;
pub mod market;
pub mod screen;
pub mod tasks;

use crate::AppState;
use axum::Router;
use serde::Serialize;

/// API response wrapper for list payloads.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
    pub count: usize,
}

impl<T> ApiResponse<Vec<T>> {
    fn list(data: Vec<T>) -> Self {
        Self {
            count: data.len(),
            data,
        }
    }
}

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(market::router())
        .nest("/api/screen", screen::router())
        .nest("/api/tasks", tasks::router())
}
