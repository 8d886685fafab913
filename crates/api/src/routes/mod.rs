//! HTTP routes

use axum::extract::State;
use axum::routing::{any, get};
use axum::{Json, Router};
use crewdesk_billing::RunReport;
use serde::Serialize;
use time::OffsetDateTime;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/internal/billing/run", any(run_recurring_billing))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Serialize)]
struct RunResponse {
    status: &'static str,
    message: String,
    results: RunReport,
}

/// Trigger one recurring billing run.
///
/// Registered for any method so external cron services with fixed verbs can
/// call it. The wall clock is read here, at the boundary; the scheduler
/// itself only ever sees the injected date. Returns 200 with the run report
/// (zero due services included), or 500 if the due-services query itself
/// failed.
async fn run_recurring_billing(State(state): State<AppState>) -> ApiResult<Json<RunResponse>> {
    let today = OffsetDateTime::now_utc().date();

    let report = state
        .scheduler
        .run_once(today)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let message = format!(
        "processed {} services: {} created, {} skipped, {} errors",
        report.processed,
        report.created,
        report.skipped,
        report.errors.len()
    );

    Ok(Json(RunResponse {
        status: "success",
        message,
        results: report,
    }))
}
