//! Single-instrument inspection and provider metadata.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::ApiResponse;
use crate::error::{AppError, Result};
use crate::services::screening::detector;
use crate::types::{DailyBar, Instrument, LimitUpRun, LookbackWindow, ProviderHealth, Signal};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StockQuery {
    pub lookback_days: Option<u32>,
}

/// One instrument's series with every detected run and its signal, if any.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockDetail {
    pub code: String,
    pub window: LookbackWindow,
    pub series: Vec<DailyBar>,
    pub runs: Vec<LimitUpRun>,
    pub signal: Option<Signal>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/stock/:code", get(stock_detail))
        .route("/api/sectors", get(sectors))
        .route("/api/verify-token", get(verify_token))
}

async fn stock_detail(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<StockQuery>,
) -> Result<Json<StockDetail>> {
    let scan = state.controller.config();
    let lookback_days = query.lookback_days.unwrap_or(scan.default_lookback_days);
    if lookback_days == 0 {
        return Err(AppError::BadRequest("lookback_days must be positive".to_string()));
    }

    let window = LookbackWindow::ending_today(lookback_days)
        .ok_or_else(|| AppError::BadRequest(format!("lookback_days {} is out of range", lookback_days)))?;
    let series = state.provider.get_daily_series(&code, &window).await?;
    if series.is_empty() {
        return Err(AppError::NotFound(format!("No daily data for {}", code)));
    }

    let runs = detector::detect(&series, scan.limit_up_threshold, scan.min_run_length);
    let signal = detector::select_signal(&Instrument::new(code.as_str(), "", ""), &series, &runs);

    Ok(Json(StockDetail {
        code,
        window,
        series,
        runs,
        signal,
    }))
}

async fn sectors(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<String>>>> {
    let sectors = state.provider.list_sectors().await?;
    Ok(Json(ApiResponse::list(sectors)))
}

async fn verify_token(State(state): State<AppState>) -> Result<Json<ProviderHealth>> {
    Ok(Json(state.provider.check_health().await?))
}
