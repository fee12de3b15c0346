use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use crate::error::AppError;
use crate::AppState;

/// Lenient body parsing: anything that is not JSON is treated as an empty request.
fn parse_body(body: &Bytes) -> Option<Value> {
    serde_json::from_slice(body).ok()
}

pub async fn initiate(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let body = parse_body(&body);
    let request = state.validator.validate(body.as_ref())?;

    let outcome = state.initiator.initiate(request).await;
    // Record creation stays detached from this response.
    drop(outcome.persistence);

    let status = if outcome.accepted {
        StatusCode::CREATED
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, Json(outcome.response)).into_response())
}

pub async fn confirm(State(state): State<AppState>, body: Bytes) -> Response {
    acknowledge(&state, "confirm", &body)
}

pub async fn timeout(State(state): State<AppState>, body: Bytes) -> Response {
    acknowledge(&state, "timeout", &body)
}

fn acknowledge(state: &AppState, kind: &'static str, body: &Bytes) -> Response {
    let body = parse_body(body);
    tracing::info!(callback = kind, "Gateway callback received");

    let outcome = state.reconciler.reconcile(body.as_ref());
    drop(outcome.finalization);

    let status = if outcome.valid {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(outcome.acknowledgment)).into_response()
}
