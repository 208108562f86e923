//! Webhook notification fan-out.

use std::collections::HashMap;

/// Outcome of a notification send.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SendOutcome {
    /// The waiting session received the notification.
    Delivered,

    /// The session's slot was already full; the notification was dropped.
    Dropped,

    /// No session is registered under the subscription id.
    NotFound,
}

/// Registry of per-subscription notification channels.
///
/// Each channel holds at most one pending message id. Sends never block:
/// the webhook ingress must not stall because a session is slow or gone.
#[derive(Default)]
pub struct NotificationBus {
    channels: tokio::sync::RwLock<HashMap<String, tokio::sync::mpsc::Sender<String>>>,
}

impl NotificationBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel for an upstream subscription id.
    ///
    /// A re-registration under the same id replaces the previous channel.
    pub async fn register(&self, subscription_id: &str) -> tokio::sync::mpsc::Receiver<String> {
        let (tx, rx) = tokio::sync::mpsc::channel(1);

        self.channels
            .write()
            .await
            .insert(subscription_id.to_string(), tx);

        tracing::info!(subscription_id = %subscription_id, "registered notification channel");
        rx
    }

    /// Route a message id to the session waiting on the subscription id.
    pub async fn send(&self, subscription_id: &str, message_id: String) -> SendOutcome {
        let channels = self.channels.read().await;

        let Some(channel) = channels.get(subscription_id) else {
            tracing::warn!(subscription_id = %subscription_id, "no notification channel registered");
            return SendOutcome::NotFound;
        };

        match channel.try_send(message_id) {
            Ok(()) => {
                tracing::info!(subscription_id = %subscription_id, "notification delivered");
                SendOutcome::Delivered
            }
            Err(tokio::sync::mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    subscription_id = %subscription_id,
                    "notification channel full, dropping notification"
                );
                SendOutcome::Dropped
            }
            Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(
                    subscription_id = %subscription_id,
                    "notification channel closed, dropping notification"
                );
                SendOutcome::Dropped
            }
        }
    }

    /// Remove a channel; the registrant's receiver sees the closure.
    pub async fn remove(&self, subscription_id: &str) {
        if self.channels.write().await.remove(subscription_id).is_some() {
            tracing::info!(subscription_id = %subscription_id, "removed notification channel");
        }
    }
}
