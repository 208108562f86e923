//! Events flowing out to subscription clients.

use mail_domain::{Email, Protocol};

/// An event emitted over a subscription stream.
///
/// A session emits `subscription` first, then heartbeats while waiting,
/// and ends with either `email` followed by `complete`, or a transport
/// specific timeout/error surface.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscribeEvent {
    /// The upstream subscription is live.
    Subscription {
        /// Human-readable confirmation.
        message: String,

        /// Rotated refresh credential, when the caller asked for one.
        refresh_token: Option<String>,
    },

    /// Keep-alive while waiting for mail.
    Heartbeat {
        /// Unix timestamp of the tick.
        timestamp: i64,

        /// Which backend the session watches.
        protocol: Protocol,
    },

    /// The awaited message.
    Email(Email),

    /// The message was delivered; the session is over.
    Complete {
        /// Human-readable confirmation.
        message: String,
    },

    /// The session deadline passed without a message.
    Timeout {
        /// Human-readable explanation.
        message: String,
    },

    /// A non-fatal or fatal session error.
    Error {
        /// Human-readable explanation.
        message: String,
    },
}

impl SubscribeEvent {
    /// Wire name of the event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Subscription { .. } => "subscription",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Email(_) => "email",
            Self::Complete { .. } => "complete",
            Self::Timeout { .. } => "timeout",
            Self::Error { .. } => "error",
        }
    }

    /// The `subscription` event for a freshly started session.
    ///
    /// The rotated credential is attached only when the caller requested
    /// rotation and the upstream returned one.
    pub(crate) fn subscribed(refresh_needed: bool, refresh_token: Option<String>) -> Self {
        Self::Subscription {
            message: "subscribed".to_string(),
            refresh_token: refresh_token.filter(|token| refresh_needed && !token.is_empty()),
        }
    }

    /// A heartbeat stamped with the current time.
    pub(crate) fn heartbeat_now(protocol: Protocol) -> Self {
        Self::Heartbeat {
            timestamp: chrono::Utc::now().timestamp(),
            protocol,
        }
    }
}
