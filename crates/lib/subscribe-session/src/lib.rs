//! Per-client subscription sessions over the IMAP and Graph backends.

mod event;
mod graph;
mod imap;
mod sink;

use std::time::Duration;

pub use crate::event::SubscribeEvent;
pub use crate::graph::run_graph_session;
pub use crate::imap::run_imap_session;
pub use crate::sink::{ChannelSink, EventSink, SinkClosed};

/// Session timer configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionTimers {
    /// Absolute session deadline, started when the event loop begins.
    /// Heartbeats do not reset it.
    pub deadline: Duration,

    /// Heartbeat cadence while waiting.
    pub heartbeat: Duration,
}

impl Default for SessionTimers {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(3 * 60),
            heartbeat: Duration::from_secs(60),
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SessionOutcome {
    /// The one message was delivered and `complete` emitted.
    Delivered,

    /// The deadline passed; the transport decides how to surface it.
    TimedOut,

    /// The client went away; nothing more is emitted.
    Disconnected,
}

/// An error that ends a session before its event loop.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Token acquisition failed.
    #[error("token acquisition failed: {0}")]
    Token(#[from] token_provider::TokenProviderError),

    /// The IMAP engine could not connect or subscribe.
    #[error("IMAP subscription failed: {0}")]
    Imap(#[from] imap_engine::EngineError),

    /// The upstream push subscription could not be created.
    #[error("creating upstream subscription failed: {0}")]
    CreateSubscription(#[source] graph_client::GraphError),
}

/// Generate a unique IMAP subscription id.
pub fn generate_subscription_id() -> String {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let random = rand::random::<u64>() >> 1;
    format!("imap_{timestamp}_{random}")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use mail_domain::{Email, Protocol};

    use super::*;

    /// Sink capturing events, with scriptable failure and disconnect.
    struct RecordingSink {
        events: Vec<SubscribeEvent>,
        fail_after: Option<usize>,
        emitted: AtomicUsize,
        disconnect: Arc<tokio::sync::Notify>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                events: Vec::new(),
                fail_after: None,
                emitted: AtomicUsize::new(0),
                disconnect: Arc::new(tokio::sync::Notify::new()),
            }
        }

        fn failing_after(count: usize) -> Self {
            Self {
                fail_after: Some(count),
                ..Self::new()
            }
        }

        fn kinds(&self) -> Vec<&'static str> {
            self.events.iter().map(SubscribeEvent::kind).collect()
        }
    }

    #[async_trait::async_trait]
    impl EventSink for RecordingSink {
        async fn emit(&mut self, event: SubscribeEvent) -> Result<(), SinkClosed> {
            let emitted = self.emitted.fetch_add(1, Ordering::SeqCst);
            if let Some(limit) = self.fail_after
                && emitted >= limit
            {
                return Err(SinkClosed);
            }
            self.events.push(event);
            Ok(())
        }

        async fn closed(&self) {
            self.disconnect.notified().await;
        }
    }

    fn message(id: &str) -> Email {
        Email {
            id: id.to_string(),
            subject: "hi".to_string(),
            ..Email::default()
        }
    }

    fn timers() -> SessionTimers {
        SessionTimers::default()
    }

    #[tokio::test(start_paused = true)]
    async fn imap_delivery_emits_email_then_complete() {
        let mut sink = RecordingSink::new();
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        tx.send(message("m1")).await.expect("channel should accept the message");

        let outcome = imap::drive(&mut sink, &mut rx, false, None, timers()).await;

        assert_eq!(outcome, SessionOutcome::Delivered);
        assert_eq!(sink.kinds(), vec!["subscription", "email", "complete"]);
        assert_eq!(sink.events[1], SubscribeEvent::Email(message("m1")));
    }

    #[tokio::test(start_paused = true)]
    async fn imap_subscription_event_carries_the_rotation() {
        let mut sink = RecordingSink::new();
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        tx.send(message("m1")).await.expect("channel should accept the message");

        imap::drive(&mut sink, &mut rx, true, Some("NEW".to_string()), timers()).await;

        assert_eq!(
            sink.events[0],
            SubscribeEvent::Subscription {
                message: "subscribed".to_string(),
                refresh_token: Some("NEW".to_string()),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn imap_deadline_times_out_after_three_heartbeats() {
        let mut sink = RecordingSink::new();
        let (_tx, mut rx) = tokio::sync::mpsc::channel::<Email>(1);

        let outcome = imap::drive(&mut sink, &mut rx, false, None, timers()).await;

        assert_eq!(outcome, SessionOutcome::TimedOut);
        assert_eq!(
            sink.kinds(),
            vec!["subscription", "heartbeat", "heartbeat", "heartbeat"]
        );
        assert!(sink
            .events
            .iter()
            .all(|event| event.kind() != "timeout" && event.kind() != "complete"));
    }

    #[tokio::test(start_paused = true)]
    async fn imap_client_disconnect_ends_silently() {
        let mut sink = RecordingSink::new();
        sink.disconnect.notify_one();
        let (_tx, mut rx) = tokio::sync::mpsc::channel::<Email>(1);

        let outcome = imap::drive(&mut sink, &mut rx, false, None, timers()).await;

        assert_eq!(outcome, SessionOutcome::Disconnected);
        assert_eq!(sink.kinds(), vec!["subscription"]);
    }

    #[tokio::test(start_paused = true)]
    async fn imap_emit_failure_ends_the_session() {
        let mut sink = RecordingSink::failing_after(1);
        let (_tx, mut rx) = tokio::sync::mpsc::channel::<Email>(1);

        let outcome = imap::drive(&mut sink, &mut rx, false, None, timers()).await;

        assert_eq!(outcome, SessionOutcome::Disconnected);
        assert_eq!(sink.kinds(), vec!["subscription"]);
    }

    #[tokio::test(start_paused = true)]
    async fn imap_closed_source_still_times_out() {
        let mut sink = RecordingSink::new();
        let (tx, mut rx) = tokio::sync::mpsc::channel::<Email>(1);
        drop(tx);

        let outcome = imap::drive(&mut sink, &mut rx, false, None, timers()).await;

        assert_eq!(outcome, SessionOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn graph_delivery_resolves_the_pushed_id() {
        let mut sink = RecordingSink::new();
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        tx.send("M7".to_string()).await.expect("channel should accept the id");

        let outcome = graph::drive(&mut sink, &mut rx, false, None, timers(), |id| async move {
            assert_eq!(id, "M7");
            Ok(Some(message("M7")))
        })
        .await;

        assert_eq!(outcome, SessionOutcome::Delivered);
        assert_eq!(sink.kinds(), vec!["subscription", "email", "complete"]);
    }

    #[tokio::test(start_paused = true)]
    async fn graph_fetch_failure_is_reported_and_the_session_continues() {
        let mut sink = RecordingSink::new();
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);

        let mut calls = 0usize;
        let fetch = move |id: String| {
            calls += 1;
            let fail = calls == 1;
            async move {
                if fail {
                    Err(graph_client::GraphError::EmptyEmailId)
                } else {
                    Ok(Some(message(&id)))
                }
            }
        };

        let driver = graph::drive(&mut sink, &mut rx, false, None, timers(), fetch);
        let feeder = async {
            tx.send("first".to_string()).await.expect("first push should be accepted");
            tx.send("second".to_string()).await.expect("second push should be accepted");
        };

        let (outcome, ()) = tokio::join!(driver, feeder);

        assert_eq!(outcome, SessionOutcome::Delivered);
        assert_eq!(sink.kinds(), vec!["subscription", "error", "email", "complete"]);
    }

    #[tokio::test(start_paused = true)]
    async fn graph_deadline_times_out() {
        let mut sink = RecordingSink::new();
        let (_tx, mut rx) = tokio::sync::mpsc::channel::<String>(1);

        let outcome = graph::drive(&mut sink, &mut rx, false, None, timers(), |_id| async move {
            Ok(None)
        })
        .await;

        assert_eq!(outcome, SessionOutcome::TimedOut);
        assert_eq!(
            sink.kinds(),
            vec!["subscription", "heartbeat", "heartbeat", "heartbeat"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_carry_the_protocol() {
        let mut sink = RecordingSink::new();
        let (_tx, mut rx) = tokio::sync::mpsc::channel::<Email>(1);

        imap::drive(&mut sink, &mut rx, false, None, timers()).await;

        let heartbeat = sink
            .events
            .iter()
            .find(|event| event.kind() == "heartbeat")
            .expect("a heartbeat should have been emitted");
        assert!(matches!(
            heartbeat,
            SubscribeEvent::Heartbeat { protocol: Protocol::Imap, .. }
        ));
    }

    #[test]
    fn subscription_ids_are_unique_and_prefixed() {
        let first = generate_subscription_id();
        let second = generate_subscription_id();

        assert!(first.starts_with("imap_"));
        assert!(second.starts_with("imap_"));
        assert_ne!(first, second);
    }
}
