//! Screening job control endpoints.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::ApiResponse;
use crate::config::ScanConfig;
use crate::error::Result;
use crate::types::{JobParams, ProgressSnapshot, Signal};
use crate::AppState;

/// Query parameters for starting a job. Omitted values use configured defaults.
#[derive(Debug, Default, Deserialize)]
pub struct StartQuery {
    pub lookback_days: Option<u32>,
    pub max_stocks: Option<usize>,
    pub screen_all: Option<bool>,
    pub batch_size: Option<usize>,
    /// Industry filter; empty means the whole market.
    pub sector: Option<String>,
}

impl StartQuery {
    pub fn into_params(self, defaults: &ScanConfig) -> JobParams {
        JobParams {
            lookback_days: self.lookback_days.unwrap_or(defaults.default_lookback_days),
            batch_size: self.batch_size.unwrap_or(defaults.default_batch_size),
            max_instruments: self.max_stocks.unwrap_or(defaults.default_max_instruments),
            universe_filter: self.sector.filter(|s| !s.trim().is_empty()),
            scan_entire_universe: self.screen_all.unwrap_or(false),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub job_id: String,
    pub started: bool,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    pub job_id: String,
    pub message: &'static str,
}

/// Create the screening router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/start", post(start))
        .route("/pause", post(pause))
        .route("/resume", post(resume))
        .route("/cancel", post(cancel))
        .route("/progress", get(progress))
        .route("/results", get(results))
}

async fn start(State(state): State<AppState>, Query(query): Query<StartQuery>) -> Result<Json<StartResponse>> {
    let params = query.into_params(&state.config.scan);
    let outcome = state.controller.start(params)?;

    Ok(Json(StartResponse {
        started: outcome.is_started(),
        message: if outcome.is_started() {
            "screening started"
        } else {
            "a screening job is already running"
        },
        job_id: outcome.job_id().to_string(),
    }))
}

async fn pause(State(state): State<AppState>) -> Result<Json<ControlResponse>> {
    let job_id = state.controller.pause()?;
    Ok(Json(ControlResponse {
        job_id,
        message: "screening paused",
    }))
}

async fn resume(State(state): State<AppState>) -> Result<Json<ControlResponse>> {
    let job_id = state.controller.resume()?;
    Ok(Json(ControlResponse {
        job_id,
        message: "screening resumed",
    }))
}

async fn cancel(State(state): State<AppState>) -> Result<Json<ControlResponse>> {
    let job_id = state.controller.cancel()?;
    Ok(Json(ControlResponse {
        job_id,
        message: "cancellation requested",
    }))
}

async fn progress(State(state): State<AppState>) -> Json<ProgressSnapshot> {
    Json(state.controller.get_progress())
}

async fn results(State(state): State<AppState>) -> Json<ApiResponse<Vec<Signal>>> {
    Json(ApiResponse::list(state.controller.get_current_results()))
}
