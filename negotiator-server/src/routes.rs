//! HTTP route handlers for the negotiation API.

use axum::Router;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use negotiator::session::{BoundaryStats, SessionError};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::sse;
use crate::state::AppState;

const MISSING_FIELDS: &str = "Missing required fields";

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/agents/process", post(process))
}

async fn health() -> &'static str {
    "ok"
}

/// GET /api/stats - session and persistence counters.
async fn stats(State(state): State<AppState>) -> Json<BoundaryStats> {
    Json(state.boundary.stats())
}

/// Body of `POST /api/agents/process`. Both fields are required; they are
/// optional here so that presence is checked by the session boundary.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    requirement: Option<String>,
    session_id: Option<String>,
}

/// POST /api/agents/process - start a negotiation and stream its events.
async fn process(
    State(state): State<AppState>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> Response {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            debug!(error = %rejection, "rejected negotiation request body");
            return (StatusCode::BAD_REQUEST, MISSING_FIELDS).into_response();
        }
    };

    match state.boundary.open(body.requirement, body.session_id) {
        Ok(events) => {
            info!("streaming negotiation");
            (
                [(header::CONNECTION, "keep-alive")],
                sse::negotiation_sse(events),
            )
                .into_response()
        }
        Err(SessionError::Invalid(err)) => {
            debug!(error = %err, "invalid negotiation request");
            (StatusCode::BAD_REQUEST, MISSING_FIELDS).into_response()
        }
        Err(err @ SessionError::AlreadyActive(_)) => {
            warn!(error = %err, "duplicate negotiation request");
            (StatusCode::CONFLICT, err.to_string()).into_response()
        }
    }
}
