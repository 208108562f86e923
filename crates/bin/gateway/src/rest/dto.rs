//! REST request and response bodies.

use mail_domain::{Email, MailAccount, Protocol};

/// Subscription request.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeMailRequest {
    /// The account to subscribe for.
    pub mail_info: MailAccount,

    /// Whether to rotate the refresh credential as part of the request.
    #[serde(default)]
    pub refresh_needed: bool,
}

/// Latest-mail request.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetLatestMailRequest {
    /// The account to read.
    pub mail_info: MailAccount,

    /// Whether to rotate the refresh credential as part of the request.
    #[serde(default)]
    pub refresh_needed: bool,
}

/// Find-by-id request.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindMailRequest {
    /// The account to read.
    pub mail_info: MailAccount,

    /// Message identifier to look up.
    pub email_id: String,
}

/// A request carrying only the account.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailInfoRequest {
    /// The account to operate on.
    pub mail_info: MailAccount,
}

/// A batch request carrying a list of accounts.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMailInfoRequest {
    /// The accounts to operate on.
    pub mail_infos: Vec<MailAccount>,
}

/// Latest-mail response.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetLatestMailResponse {
    /// The newest message, absent when the folder is empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<Email>,

    /// The rotated refresh credential, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_refresh_token: Option<String>,
}

/// Find-by-id response.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindMailResponse {
    /// The matched message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<Email>,
}

/// Token rotation response.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenResponse {
    /// The rotated refresh credential.
    pub new_refresh_token: String,
}

/// Per-account entry of the batch rotation response.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRefreshEntry {
    /// The account's mailbox address.
    pub email: String,

    /// The rotated credential on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_refresh_token: Option<String>,

    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Batch rotation response.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRefreshResponse {
    /// How many rotations succeeded.
    pub success_count: usize,

    /// How many rotations failed.
    pub fail_count: usize,

    /// Per-account results.
    pub results: Vec<BatchRefreshEntry>,
}

/// Protocol detection response.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectProtocolResponse {
    /// The detected protocol.
    pub protocol: Protocol,
}

/// Per-account entry of the batch detection response.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDetectEntry {
    /// The account's mailbox address.
    pub email: String,

    /// Detected protocol on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,

    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Batch detection response.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDetectResponse {
    /// How many detections succeeded.
    pub success_count: usize,

    /// How many detections failed.
    pub fail_count: usize,

    /// Per-account results.
    pub results: Vec<BatchDetectEntry>,
}

/// One webhook notification entry.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    /// The upstream subscription the notification belongs to.
    pub subscription_id: String,

    /// The changed resource.
    pub resource_data: ResourceData,
}

/// The changed resource of a notification.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceData {
    /// Upstream message id.
    pub id: String,
}

/// The webhook notification envelope.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NotificationCollection {
    /// The notification entries.
    #[serde(default)]
    pub value: Vec<NotificationData>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_collection_parses_the_push_shape() {
        let collection: NotificationCollection = serde_json::from_str(
            r#"{"value":[{"subscriptionId":"S1","resourceData":{"id":"M7"}}]}"#,
        )
        .expect("notification body should parse");

        assert_eq!(collection.value.len(), 1);
        assert_eq!(collection.value[0].subscription_id, "S1");
        assert_eq!(collection.value[0].resource_data.id, "M7");
    }

    #[test]
    fn subscribe_request_defaults_refresh_needed_off() {
        let request: SubscribeMailRequest = serde_json::from_str(
            r#"{"mailInfo":{"email":"a@b.c","clientId":"c","refreshToken":"r","protocol":"IMAP","serviceProvider":"MICROSOFT"}}"#,
        )
        .expect("request should parse");

        assert!(!request.refresh_needed);
        assert_eq!(request.mail_info.protocol, Protocol::Imap);
    }
}
