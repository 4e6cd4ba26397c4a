//! API route definitions.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use super::state::AppState;
use crate::dispatch::{RunRequest, RunStatus};
use crate::storage::{self, RunFilter};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/run-tests", post(run_tests))
        .route("/results", get(list_results))
        .route("/results/latest", get(latest_result))
        .route("/statistics", get(get_statistics))
        .route("/e2e-urls", get(list_e2e_urls))
}

type ApiError = (StatusCode, Json<Value>);

fn internal_error(e: anyhow::Error) -> ApiError {
    error!(error = %e, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

fn envelope(data: Value, meta: Value) -> Json<Value> {
    Json(json!({ "data": data, "meta": meta }))
}

fn meta() -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

async fn health() -> Json<Value> {
    envelope(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }), meta())
}

#[derive(Debug, Deserialize)]
struct RunTestsBody {
    category: String,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

async fn run_tests(
    State(state): State<AppState>,
    Json(body): Json<RunTestsBody>,
) -> Result<Json<Value>, ApiError> {
    let req = RunRequest {
        file: body.file,
        name: body.name,
        url: body.url,
    };
    let results = state
        .dispatcher
        .run(&body.category, req)
        .await
        .map_err(internal_error)?;

    let total = results.len();
    Ok(envelope(
        json!({ "results": results }),
        json!({ "total": total }),
    ))
}

#[derive(Debug, Deserialize)]
struct ResultsQuery {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    status: Option<String>,
    /// Restrict to the last N days.
    #[serde(default)]
    days: Option<i64>,
    #[serde(default)]
    limit: Option<u32>,
}

async fn list_results(
    State(state): State<AppState>,
    Query(query): Query<ResultsQuery>,
) -> Result<Json<Value>, ApiError> {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(raw.parse::<RunStatus>().map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.to_string() })),
            )
        })?),
    };

    let filter = RunFilter {
        category: query.category,
        status,
        since: query
            .days
            .map(|d| chrono::Utc::now() - chrono::Duration::days(d)),
        until: None,
        limit: query.limit,
    };

    let runs = storage::query_runs(&state.pool, &filter).map_err(internal_error)?;
    let total = runs.len();
    Ok(envelope(json!(runs), json!({ "total": total })))
}

async fn latest_result(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let latest = storage::latest_run(&state.pool).map_err(internal_error)?;
    match latest {
        Some(run) => Ok(envelope(json!(run), meta())),
        None => Ok(envelope(
            Value::Null,
            json!({ "message": "no test results yet" }),
        )),
    }
}

async fn get_statistics(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let stats = storage::statistics(&state.pool).map_err(internal_error)?;
    Ok(envelope(json!(stats), meta()))
}

async fn list_e2e_urls(State(state): State<AppState>) -> Json<Value> {
    let urls = state
        .config
        .read()
        .expect("config lock poisoned")
        .e2e_urls
        .clone();
    let total = urls.len();
    envelope(json!({ "urls": urls }), json!({ "total": total }))
}
