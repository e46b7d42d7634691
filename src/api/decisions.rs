//! `GET/POST /api/decisions*`: read/resolve/dismiss REST for a web UI, plus
//! the decision-filtered SSE re-broadcast of the daemon's own event stream.

use super::state::{ApiState, DecisionEvent};
use crate::bead::{BeadEvent, BeadStatus, BeadType};
use crate::daemon_client::ResolveDecisionRequest;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (status, Json(ErrorBody { error: message.into() })).into_response()
}

pub async fn list(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ListQuery>,
) -> axum::response::Response {
    match state.daemon.list_decision_beads().await {
        Ok(beads) => {
            let filtered: Vec<BeadEvent> = match query.status.as_deref() {
                None => beads,
                Some(status) => beads
                    .into_iter()
                    .filter(|b| status_matches(&b.status, status))
                    .collect(),
            };
            Json(filtered).into_response()
        }
        Err(e) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

fn status_matches(status: &BeadStatus, wanted: &str) -> bool {
    let label = match status {
        BeadStatus::Open => "open",
        BeadStatus::InProgress => "in_progress",
        BeadStatus::Blocked => "blocked",
        BeadStatus::Deferred => "deferred",
        BeadStatus::Closed => "closed",
    };
    label == wanted
}

pub async fn get(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match state.daemon.get_bead(&id).await {
        Ok(bead) if bead.kind == BeadType::Decision => Json(bead).into_response(),
        Ok(_) => error_response(StatusCode::NOT_FOUND, format!("{id} is not a decision")),
        Err(e) => error_response(StatusCode::NOT_FOUND, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct ResolveBody {
    pub chosen: Option<String>,
    pub rationale: Option<String>,
    #[serde(rename = "respondedBy")]
    pub responded_by: String,
}

pub async fn resolve(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(body): Json<ResolveBody>,
) -> axum::response::Response {
    if body.responded_by.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "respondedBy is required");
    }
    let request = ResolveDecisionRequest {
        selected_option: body.chosen,
        response_text: body.rationale,
        responded_by: body.responded_by,
    };
    match state.daemon.resolve_decision(&id, request).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct DismissBody {
    pub reason: String,
    #[serde(rename = "canceledBy")]
    pub canceled_by: String,
}

pub async fn dismiss(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(body): Json<DismissBody>,
) -> axum::response::Response {
    match state
        .daemon
        .cancel_decision(&id, &body.reason, &body.canceled_by)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

/// `GET /api/decisions/events`: a browser-facing SSE re-broadcast of the
/// daemon's stream, filtered to decision beads and remapped to
/// `created`/`updated`/`closed`. Built with `async_stream::stream!`, the same
/// way the reference architecture's own system-events SSE handler is built,
/// including lagged-receiver handling.
pub async fn events(
    State(state): State<Arc<ApiState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.decision_events.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        yield Ok(Event::default().event("decision").data(json));
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(count)) => {
                    tracing::debug!(count, "decision SSE client lagged");
                    yield Ok(Event::default().event("lagged").data(format!("{{\"skipped\":{count}}}")));
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
}

/// Publishes a bead lifecycle event onto the decision SSE channel iff it is a
/// decision bead. Called from the bridge's SSE handler registrations.
pub fn publish(state: &Arc<ApiState>, kind: &'static str, bead: BeadEvent) {
    if bead.kind != BeadType::Decision {
        return;
    }
    // A send error just means there are no current subscribers.
    let _ = state.decision_events.send(DecisionEvent { kind, bead });
}
