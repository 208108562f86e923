//! Unified SSE subscription endpoint.

use std::convert::Infallible;

use axum::extract::{Json, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::response::sse::{Event, Sse};
use futures_util::StreamExt as _;
use mail_domain::Protocol;
use subscribe_session::{
    ChannelSink, SessionOutcome, SubscribeEvent, run_graph_session, run_imap_session,
};
use tokio_stream::wrappers::ReceiverStream;

use crate::rest::dto::SubscribeMailRequest;
use crate::state::AppState;

/// Subscribe for the next inbound message, streamed as SSE events.
pub async fn subscribe_sse(
    State(state): State<AppState>,
    Json(request): Json<SubscribeMailRequest>,
) -> impl IntoResponse {
    tracing::info!(
        email = %request.mail_info.email,
        protocol = %request.mail_info.protocol,
        refresh_needed = request.refresh_needed,
        "subscription request received"
    );

    let (tx, rx) = tokio::sync::mpsc::channel::<SubscribeEvent>(16);
    tokio::spawn(run_subscription(state, request, tx));

    let stream = ReceiverStream::new(rx).map(|event| Ok::<Event, Infallible>(to_sse_event(event)));

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Sse::new(stream),
    )
}

/// Drive one session and surface its terminal condition as SSE events.
async fn run_subscription(
    state: AppState,
    request: SubscribeMailRequest,
    tx: tokio::sync::mpsc::Sender<SubscribeEvent>,
) {
    let mut sink = ChannelSink::new(tx.clone());
    let account = &request.mail_info;

    let result = match account.protocol {
        Protocol::Imap => {
            run_imap_session(
                &state.provider,
                account,
                request.refresh_needed,
                state.timers,
                &mut sink,
            )
            .await
        }
        Protocol::Graph => {
            run_graph_session(
                &state.provider,
                account,
                request.refresh_needed,
                &state.graph,
                &state.bus,
                &state.notification_url,
                state.timers,
                &mut sink,
            )
            .await
        }
        Protocol::Unknown => {
            let _ = tx
                .send(SubscribeEvent::Error {
                    message: format!("unsupported protocol: {}", account.protocol),
                })
                .await;
            return;
        }
    };

    match result {
        Ok(SessionOutcome::TimedOut) => {
            let _ = tx
                .send(SubscribeEvent::Timeout {
                    message: "timed out waiting for mail, subscription expired".to_string(),
                })
                .await;
        }
        Ok(SessionOutcome::Delivered) | Ok(SessionOutcome::Disconnected) => {}
        Err(error) => {
            tracing::error!(error = %error, email = %account.email, "subscription session failed");
            let _ = tx
                .send(SubscribeEvent::Error {
                    message: error.to_string(),
                })
                .await;
        }
    }
}

/// Serialize an event onto the SSE wire.
fn to_sse_event(event: SubscribeEvent) -> Event {
    let kind = event.kind();
    let data = event_payload(event);
    Event::default().event(kind).data(data.to_string())
}

fn event_payload(event: SubscribeEvent) -> serde_json::Value {
    match event {
        SubscribeEvent::Subscription {
            message,
            refresh_token,
        } => match refresh_token {
            Some(refresh_token) => serde_json::json!({
                "message": message,
                "refreshToken": refresh_token,
            }),
            None => serde_json::json!({ "message": message }),
        },
        SubscribeEvent::Heartbeat {
            timestamp,
            protocol,
        } => serde_json::json!({
            "timestamp": timestamp,
            "protocol": protocol.as_str().to_lowercase(),
        }),
        SubscribeEvent::Email(email) => {
            serde_json::to_value(email).unwrap_or_else(|_| serde_json::json!({}))
        }
        SubscribeEvent::Complete { message }
        | SubscribeEvent::Timeout { message }
        | SubscribeEvent::Error { message } => serde_json::json!({ "message": message }),
    }
}
