//! API route definitions.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use super::state::AppState;
use crate::alert::ticket::MANUAL_TITLE;
use crate::alert::{write_evidence, Ticket, TicketWindow};

const DEFAULT_SAMPLE_MINUTES: i64 = 15;
const MAX_SAMPLE_MINUTES: i64 = 24 * 60;
const DEFAULT_INCIDENT_LIMIT: usize = 20;
const MAX_INCIDENT_LIMIT: usize = 500;

type ApiError = (StatusCode, Json<Value>);

fn internal_error(message: &str, e: impl std::fmt::Display) -> ApiError {
    error!(error = %e, "{}", message);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message, "detail": e.to_string() })),
    )
}

fn meta() -> Value {
    json!({
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/samples", get(samples))
        .route("/incidents", get(list_incidents))
        .route("/alert", post(manual_alert))
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": meta()
    }))
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    let status = state.monitor.status().await;
    let anomalous =
        status.anomaly_ready && status.anomaly_score >= state.config.detect.anomaly_threshold;
    Json(json!({
        "data": {
            "target_host": state.config.probe.target_host,
            "anomalous": anomalous,
            "monitor": status,
        },
        "meta": meta()
    }))
}

#[derive(Debug, Deserialize)]
struct SamplesQuery {
    minutes: Option<i64>,
}

async fn samples(State(state): State<AppState>, Query(q): Query<SamplesQuery>) -> Json<Value> {
    let minutes = q
        .minutes
        .unwrap_or(DEFAULT_SAMPLE_MINUTES)
        .clamp(1, MAX_SAMPLE_MINUTES);
    let since = Utc::now() - chrono::Duration::minutes(minutes);
    let samples = state.monitor.snapshot(since).await;
    Json(json!({
        "data": samples,
        "meta": { "total": samples.len(), "minutes": minutes, "since": since.to_rfc3339() }
    }))
}

#[derive(Debug, Deserialize)]
struct IncidentsQuery {
    limit: Option<usize>,
}

async fn list_incidents(
    State(state): State<AppState>,
    Query(q): Query<IncidentsQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = q.limit.unwrap_or(DEFAULT_INCIDENT_LIMIT).min(MAX_INCIDENT_LIMIT);
    let manager = state.incidents.clone();
    let incidents = tokio::task::spawn_blocking(move || manager.list_recent(limit))
        .await
        .map_err(|e| internal_error("incident query panicked", e))?
        .map_err(|e| internal_error("failed to list incidents", e))?;

    Ok(Json(json!({
        "data": incidents,
        "meta": { "total": incidents.len() }
    })))
}

/// Open a ticket by hand, attaching the last 15 minutes of samples as evidence.
async fn manual_alert(
    State(state): State<AppState>,
    Json(summary): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let now = Utc::now();
    let from = now - chrono::Duration::minutes(DEFAULT_SAMPLE_MINUTES);
    let samples = state.monitor.snapshot(from).await;

    let evidence = write_evidence(&state.config.paths.reports_dir, &samples, now)
        .await
        .map_err(|e| internal_error("failed to write evidence", e))?;
    let ticket = Ticket {
        title: MANUAL_TITLE.to_string(),
        window: TicketWindow { from, to: now },
        summary,
        plots: vec![evidence.display().to_string()],
    };
    let path = state
        .tickets
        .create(&ticket)
        .await
        .map_err(|e| internal_error("failed to create ticket", e))?;

    info!(ticket = %path.display(), samples = samples.len(), "Manual alert ticket created");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "data": {
                "ticket": path.display().to_string(),
                "evidence": evidence.display().to_string(),
                "samples": samples.len(),
            },
            "meta": meta()
        })),
    ))
}
