use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chat_core::assistant::TurnError;
use chat_core::error::ErrorKind;
use chat_core::models::ChatResponse;
use tracing::{error, warn};

use super::observability::record_turn_outcome;

pub(super) fn turn_error_response(
    request_id: &str,
    thread_id: Option<&str>,
    err: &TurnError,
) -> Response {
    let kind = err.kind();
    record_turn_outcome(None, Some(kind));
    if kind.is_client_error() {
        warn!(request_id = %request_id, error_kind = %kind, "rejected chat request");
    } else {
        error!(
            request_id = %request_id,
            thread_id = thread_id.unwrap_or_default(),
            error_kind = %kind,
            error = %err,
            details = ?err,
            "chat request failed"
        );
    }

    (
        status_for_kind(kind),
        Json(ChatResponse {
            response: err.client_message(),
        }),
    )
        .into_response()
}

fn status_for_kind(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::RemoteTransient | ErrorKind::RemoteFatal | ErrorKind::NotFound => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
