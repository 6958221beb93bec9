//! REST endpoints wrapping the dispatch engine.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;

use crate::error::ErrorKind;
use crate::notify::{DispatchOutcome, Dispatcher, RawPayload};

/// Shared state for courier routes.
#[derive(Clone)]
pub struct CourierState {
    pub dispatcher: Arc<Dispatcher>,
}

/// Build the courier REST routes.
pub fn courier_routes(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/notify_chat", post(notify_chat))
        .route("/notify_mail", post(notify_mail))
        .route("/notify", post(notify))
        .with_state(CourierState { dispatcher })
}

async fn health(State(state): State<CourierState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "courier",
        "backends": state.dispatcher.availability(),
    }))
}

/// POST /notify_chat
///
/// `{"channel": "general", "source": "of_core", "m_body": "..."}`.
/// Only `m_body` is required.
async fn notify_chat(
    State(state): State<CourierState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let content = request_content(body);
    let outcome = state
        .dispatcher
        .dispatch_chat(&RawPayload::from_value(content.clone()))
        .await;
    respond(outcome, content)
}

/// POST /notify_mail
///
/// `{"m_from": ..., "m_to": "a@x.com, b@y.com", "m_subject": ..., "m_body": ...}`.
/// Missing fields fall back to configured defaults.
async fn notify_mail(
    State(state): State<CourierState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let content = request_content(body);
    let outcome = state
        .dispatcher
        .dispatch_mail(&RawPayload::from_value(content.clone()))
        .await;
    respond(outcome, content)
}

/// POST /notify
///
/// Tries chat, then mail, whichever is configured.
async fn notify(
    State(state): State<CourierState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let content = request_content(body);
    let outcome = state
        .dispatcher
        .dispatch_auto(&RawPayload::from_value(content.clone()))
        .await;
    respond(outcome, content)
}

fn request_content(body: Result<Json<Value>, JsonRejection>) -> Value {
    match body {
        Ok(Json(value)) => value,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Unreadable notification request");
            Value::Null
        }
    }
}

/// HTTP status for a failure kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ValidationError => StatusCode::NOT_ACCEPTABLE,
        ErrorKind::ChatApiError | ErrorKind::ChatConnectionError | ErrorKind::MailTransportError => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::ChatUnavailableError
        | ErrorKind::MailUnavailableError
        | ErrorKind::NoBackendConfiguredError => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn respond(outcome: DispatchOutcome, content: Value) -> Response {
    match outcome.error {
        None => (StatusCode::OK, Json(content)).into_response(),
        Some(err) => {
            tracing::warn!(
                backend = ?outcome.backend_used,
                kind = %err.kind,
                error = %err.message,
                "Notification not delivered"
            );
            (
                status_for(err.kind),
                Json(serde_json::json!({
                    "error": err.message,
                    "kind": err.kind,
                })),
            )
                .into_response()
        }
    }
}
