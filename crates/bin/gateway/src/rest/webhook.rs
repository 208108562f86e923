//! Graph webhook ingress.

use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};

use crate::rest::dto::NotificationCollection;
use crate::state::AppState;

/// Query parameters of the subscription validation handshake.
#[derive(Debug, serde::Deserialize)]
pub struct WebhookQuery {
    /// Present when the upstream verifies webhook ownership.
    #[serde(rename = "validationToken")]
    pub validation_token: Option<String>,
}

/// Handle a webhook call: the validation handshake or a notification push.
pub async fn graph_webhook(
    State(state): State<AppState>,
    Query(query): Query<WebhookQuery>,
    body: String,
) -> Response {
    if let Some(token) = query.validation_token {
        tracing::info!("webhook validation handshake");
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            token,
        )
            .into_response();
    }

    let notifications: NotificationCollection = match serde_json::from_str(&body) {
        Ok(notifications) => notifications,
        Err(error) => {
            tracing::error!(error = %error, "unparsable webhook notification body");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": "unparsable notification body" })),
            )
                .into_response();
        }
    };

    for notification in notifications.value {
        let outcome = state
            .bus
            .send(&notification.subscription_id, notification.resource_data.id)
            .await;
        tracing::debug!(
            subscription_id = %notification.subscription_id,
            outcome = ?outcome,
            "processed webhook notification"
        );
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({ "message": "notifications processed" })),
    )
        .into_response()
}
