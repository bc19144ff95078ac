use std::sync::Arc;

use axum::http::{HeaderValue, header};
use axum::routing::{get, post};
use axum::{Router, middleware};
use chat_core::assistant::TurnExecutor;
use tokio_util::sync::CancellationToken;
use tower_http::set_header::SetResponseHeaderLayer;

mod chat;
mod errors;
mod health;
mod observability;

#[derive(Clone)]
pub struct AppState {
    pub turns: Arc<TurnExecutor>,
    /// Cancelled on shutdown; every in-flight turn waits on a child of it.
    pub shutdown: CancellationToken,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route(
            "/start",
            get(chat::start_session).options(chat::preflight),
        )
        .route("/chat", post(chat::chat).options(chat::preflight))
        .layer(middleware::from_fn(
            observability::request_observability_middleware,
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET,POST,OPTIONS"),
        ))
        .with_state(app_state)
}
