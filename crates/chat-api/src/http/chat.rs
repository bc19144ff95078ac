use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chat_core::models::{ChatRequest, ChatResponse, StartSessionResponse};
use tracing::debug;

use super::AppState;
use super::errors::turn_error_response;
use super::observability::{RequestContext, record_turn_outcome};

pub(super) async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub(super) async fn start_session(
    State(state): State<AppState>,
    Extension(request_context): Extension<RequestContext>,
) -> Response {
    match state.turns.start_session().await {
        Ok(thread_id) => {
            record_turn_outcome(Some(&thread_id), None);
            (StatusCode::OK, Json(StartSessionResponse { thread_id })).into_response()
        }
        Err(err) => turn_error_response(&request_context.request_id, None, &err),
    }
}

pub(super) async fn chat(
    State(state): State<AppState>,
    Extension(request_context): Extension<RequestContext>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!(
                request_id = %request_context.request_id,
                reason = %rejection.body_text(),
                "unreadable chat body; treating as empty"
            );
            ChatRequest::default()
        }
    };
    let thread_id = request.thread_id.unwrap_or_default();
    let message = request.message.unwrap_or_default();
    record_turn_outcome(Some(thread_id.trim()), None);

    let cancel = state.shutdown.child_token();
    match state.turns.run_turn(&thread_id, &message, &cancel).await {
        Ok(response) => (StatusCode::OK, Json(ChatResponse { response })).into_response(),
        Err(err) => turn_error_response(&request_context.request_id, Some(&thread_id), &err),
    }
}
