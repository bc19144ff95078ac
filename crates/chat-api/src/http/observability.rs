use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use chat_core::error::ErrorKind;
use tracing::field::Empty;
use tracing::{Instrument, Span, info, info_span, warn};
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_REQUEST_ID_LEN: usize = 128;

#[derive(Clone, Debug)]
pub(super) struct RequestContext {
    pub(super) request_id: String,
}

/// Wraps each request in a `chat_request` span. Handlers fill in `thread_id` and
/// `error_kind` through [`record_turn_outcome`], so the completion event carries them.
pub(super) async fn request_observability_middleware(mut req: Request, next: Next) -> Response {
    let request_id =
        client_request_id(req.headers()).unwrap_or_else(|| Uuid::new_v4().to_string());
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());

    let span = info_span!(
        "chat_request",
        request_id = %request_id,
        method = %req.method(),
        route = %route,
        thread_id = Empty,
        error_kind = Empty,
    );
    req.extensions_mut().insert(RequestContext {
        request_id: request_id.clone(),
    });

    let started_at = Instant::now();
    let mut response = next.run(req).instrument(span.clone()).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    let status = response.status();
    let latency_ms = started_at.elapsed().as_millis() as u64;
    span.in_scope(|| {
        if status.is_server_error() {
            warn!(status = status.as_u16(), latency_ms, "chat request failed upstream");
        } else {
            info!(status = status.as_u16(), latency_ms, "chat request finished");
        }
    });

    response
}

/// Attaches turn details to the enclosing request span.
pub(super) fn record_turn_outcome(thread_id: Option<&str>, kind: Option<ErrorKind>) {
    let span = Span::current();
    if let Some(thread_id) = thread_id.filter(|id| !id.is_empty()) {
        span.record("thread_id", thread_id);
    }
    if let Some(kind) = kind {
        span.record("error_kind", kind.label());
    }
}

/// Caller-supplied id, when it is short and made of `[A-Za-z0-9._-]`.
fn client_request_id(headers: &HeaderMap) -> Option<String> {
    let candidate = headers.get(REQUEST_ID_HEADER)?.to_str().ok()?.trim();
    let acceptable = (1..=MAX_REQUEST_ID_LEN).contains(&candidate.len())
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    acceptable.then(|| candidate.to_owned())
}
