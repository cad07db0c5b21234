//! Task history endpoints backed by the task store.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::ApiResponse;
use crate::error::{AppError, Result};
use crate::types::{Job, ProgressSnapshot, Signal, TaskStats};
use crate::AppState;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ListQuery {
    /// Resolve paging, rejecting limits outside `1..=100`.
    pub fn paging(&self) -> Result<(usize, usize)> {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(AppError::BadRequest(format!(
                "limit must be between 1 and {}",
                MAX_LIMIT
            )));
        }
        Ok((limit, self.offset.unwrap_or(0)))
    }
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<Job>,
    pub limit: usize,
    pub offset: usize,
}

/// Stored job plus the live snapshot while it is still held in memory.
#[derive(Debug, Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub job: Job,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live: Option<ProgressSnapshot>,
}

/// Create the tasks router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tasks))
        .route("/stats", get(stats))
        .route("/:id", get(get_task).delete(delete_task))
        .route("/:id/results", get(task_results))
}

async fn list_tasks(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Result<Json<TaskListResponse>> {
    let (limit, offset) = query.paging()?;
    Ok(Json(TaskListResponse {
        tasks: state.store.list_jobs(limit, offset),
        limit,
        offset,
    }))
}

async fn stats(State(state): State<AppState>) -> Json<TaskStats> {
    Json(state.store.get_stats())
}

async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<TaskDetail>> {
    let job = state
        .store
        .get_job(&id)
        .ok_or_else(|| AppError::NotFound(format!("Task not found: {}", id)))?;

    Ok(Json(TaskDetail {
        live: state.controller.job_progress(&id),
        job,
    }))
}

async fn task_results(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<ApiResponse<Vec<Signal>>>> {
    if state.store.get_job(&id).is_none() {
        return Err(AppError::NotFound(format!("Task not found: {}", id)));
    }
    Ok(Json(ApiResponse::list(state.store.get_results(&id))))
}

async fn delete_task(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<serde_json::Value>> {
    state.controller.delete_job(&id)?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}
