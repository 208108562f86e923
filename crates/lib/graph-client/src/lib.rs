//! HTTP client for the Graph mail API.

mod types;

use mail_domain::Email;

pub use crate::types::CreatedSubscription;

/// API base URL.
const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Fields requested for message payloads.
const SELECT_FIELDS: &str = "subject,from,toRecipients,receivedDateTime,bodyPreview,body";

/// Lifetime of a push subscription, in minutes.
///
/// Slightly longer than the session deadline so a notification racing the
/// teardown still has a live subscription.
const SUBSCRIPTION_LIFETIME_MINUTES: i64 = 5;

/// An error that can occur while talking to the mail API.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The access token is empty.
    #[error("access token must not be empty")]
    EmptyAccessToken,

    /// The message id is empty.
    #[error("email id must not be empty")]
    EmptyEmailId,

    /// The subscription id is empty.
    #[error("subscription id must not be empty")]
    EmptySubscriptionId,

    /// The notification URL is empty.
    #[error("notification URL must not be empty")]
    EmptyNotificationUrl,

    /// Transport-level HTTP failure.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: reqwest::StatusCode,
        /// The response body, for diagnostics.
        body: String,
    },
}

/// Client for the Graph mail API.
#[derive(Clone)]
pub struct GraphClient {
    http_client: reqwest::Client,
}

impl GraphClient {
    /// Create a client over the given HTTP client.
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Create a push subscription for new inbox messages.
    pub async fn create_subscription(
        &self,
        access_token: &str,
        notification_url: &str,
    ) -> Result<CreatedSubscription, GraphError> {
        if access_token.is_empty() {
            return Err(GraphError::EmptyAccessToken);
        }
        if notification_url.is_empty() {
            return Err(GraphError::EmptyNotificationUrl);
        }

        let request = types::SubscriptionRequest {
            resource: "me/mailFolders('Inbox')/messages",
            change_type: "created",
            notification_url: notification_url.to_string(),
            expiration_date_time: chrono::Utc::now()
                + chrono::Duration::minutes(SUBSCRIPTION_LIFETIME_MINUTES),
        };

        let response = self
            .http_client
            .post(format!("{GRAPH_BASE_URL}/subscriptions"))
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::CREATED {
            return Err(status_error(response).await);
        }

        let created: CreatedSubscription = response.json().await?;
        tracing::info!(subscription_id = %created.id, "created mail subscription");
        Ok(created)
    }

    /// Delete a push subscription.
    pub async fn delete_subscription(
        &self,
        access_token: &str,
        subscription_id: &str,
    ) -> Result<(), GraphError> {
        if access_token.is_empty() {
            return Err(GraphError::EmptyAccessToken);
        }
        if subscription_id.is_empty() {
            return Err(GraphError::EmptySubscriptionId);
        }

        let response = self
            .http_client
            .delete(format!("{GRAPH_BASE_URL}/subscriptions/{subscription_id}"))
            .bearer_auth(access_token)
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::NO_CONTENT {
            return Err(status_error(response).await);
        }

        Ok(())
    }

    /// Fetch one message by its API id.
    pub async fn get_email_by_id(
        &self,
        access_token: &str,
        email_id: &str,
    ) -> Result<Option<Email>, GraphError> {
        if access_token.is_empty() {
            return Err(GraphError::EmptyAccessToken);
        }
        if email_id.is_empty() {
            return Err(GraphError::EmptyEmailId);
        }

        let url = format!("{GRAPH_BASE_URL}/me/messages/{email_id}?$select={SELECT_FIELDS}");
        let response = self
            .http_client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(status_error(response).await);
        }

        let data: types::EmailData = response.json().await?;
        Ok(Some(data.into_email()))
    }

    /// Fetch the newest inbox message, if any.
    pub async fn get_latest_email(&self, access_token: &str) -> Result<Option<Email>, GraphError> {
        self.get_latest_from_folder(access_token, "Inbox").await
    }

    /// Fetch the newest junk message, if any.
    pub async fn get_latest_junk_email(
        &self,
        access_token: &str,
    ) -> Result<Option<Email>, GraphError> {
        self.get_latest_from_folder(access_token, "junkemail").await
    }

    // The list endpoints return newest-first by default; `$orderby` is
    // avoided since it misbehaves on some folders.
    async fn get_latest_from_folder(
        &self,
        access_token: &str,
        folder: &str,
    ) -> Result<Option<Email>, GraphError> {
        if access_token.is_empty() {
            return Err(GraphError::EmptyAccessToken);
        }

        let url = format!(
            "{GRAPH_BASE_URL}/me/mailFolders/{folder}/messages?$top=1&$select={SELECT_FIELDS}"
        );
        let response = self
            .http_client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(status_error(response).await);
        }

        let list: types::EmailListResponse = response.json().await?;
        Ok(list.value.into_iter().next().map(types::EmailData::into_email))
    }
}

async fn status_error(response: reqwest::Response) -> GraphError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    GraphError::Status { status, body }
}
