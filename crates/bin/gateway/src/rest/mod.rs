//! REST surface: router, handlers, DTOs.

mod dto;
mod error;
mod mail;
mod protocol;
mod subscribe;
mod token;
mod webhook;

use axum::Router;
use axum::routing::{get, post};

use crate::state::AppState;

/// Build the REST router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/subscribe-sse", post(subscribe::subscribe_sse))
        .route(
            "/api/v1/graph/webhook",
            get(webhook::graph_webhook).post(webhook::graph_webhook),
        )
        .route("/api/v1/mail/new", post(mail::latest_mail))
        .route("/api/v1/mail/find", post(mail::find_mail))
        .route("/api/v1/mail/junk/new", post(mail::latest_junk_mail))
        .route("/api/v1/token/refresh", post(token::refresh_token))
        .route("/api/v1/token/refresh/batch", post(token::batch_refresh_token))
        .route("/api/v1/protocol/detect", post(protocol::detect_protocol))
        .route(
            "/api/v1/protocol/detect/batch",
            post(protocol::batch_detect_protocol),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
