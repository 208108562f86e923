//! Wire types of the Graph mail API.

use mail_domain::{Email, EmailAddress, clean_email_address};

/// Subscription creation request body.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubscriptionRequest {
    /// Watched resource path.
    pub resource: &'static str,

    /// Change type to be notified about.
    pub change_type: &'static str,

    /// Where the upstream pushes notifications.
    pub notification_url: String,

    /// When the subscription lapses.
    pub expiration_date_time: chrono::DateTime<chrono::Utc>,
}

/// Subscription creation response.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CreatedSubscription {
    /// Upstream subscription identifier.
    pub id: String,
}

/// A message as returned by the mail endpoints.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct EmailData {
    pub id: String,
    pub subject: String,
    pub received_date_time: String,
    pub body_preview: String,
    pub body: EmailBody,
    pub from: Option<Recipient>,
    pub to_recipients: Vec<Recipient>,
}

/// Message body payload.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct EmailBody {
    pub content: String,
}

/// A name/address pair wrapper.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct Recipient {
    pub email_address: RecipientAddress,
}

/// The name/address pair itself.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default)]
pub(crate) struct RecipientAddress {
    pub name: String,
    pub address: String,
}

/// A message list response.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default)]
pub(crate) struct EmailListResponse {
    pub value: Vec<EmailData>,
}

impl EmailData {
    /// Convert into the canonical record.
    pub(crate) fn into_email(self) -> Email {
        let from = self.from.as_ref().map(Recipient::to_address);
        let to = self.to_recipients.first().map(Recipient::to_address);

        Email {
            id: self.id,
            subject: self.subject,
            from,
            to,
            date: self.received_date_time,
            text: self.body_preview,
            html: self.body.content,
        }
    }
}

impl Recipient {
    fn to_address(&self) -> EmailAddress {
        clean_email_address(&self.email_address.name, &self.email_address.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_a_message_and_cleans_redundant_names() {
        let data: EmailData = serde_json::from_value(serde_json::json!({
            "id": "M7",
            "subject": "hello",
            "receivedDateTime": "2025-07-07T09:30:00Z",
            "bodyPreview": "hello preview",
            "body": { "content": "<p>hello</p>" },
            "from": {
                "emailAddress": { "name": "alice@example.com", "address": "alice@example.com" }
            },
            "toRecipients": [
                { "emailAddress": { "name": "Bob", "address": "bob@example.com" } }
            ]
        }))
        .expect("message payload should deserialize");

        let email = data.into_email();
        assert_eq!(email.id, "M7");
        assert_eq!(email.date, "2025-07-07T09:30:00Z");
        assert_eq!(email.text, "hello preview");
        assert_eq!(email.html, "<p>hello</p>");

        let from = email.from.expect("sender should be present");
        assert_eq!(from.name, "");
        assert_eq!(from.address, "alice@example.com");

        let to = email.to.expect("recipient should be present");
        assert_eq!(to.name, "Bob");
    }

    #[test]
    fn tolerates_missing_recipients() {
        let data: EmailData = serde_json::from_value(serde_json::json!({
            "id": "M8",
            "subject": "no recipients",
            "receivedDateTime": "2025-07-07T09:30:00Z",
            "bodyPreview": "",
            "body": { "content": "" }
        }))
        .expect("message payload should deserialize");

        let email = data.into_email();
        assert!(email.from.is_none());
        assert!(email.to.is_none());
    }
}
