//! Graph webhook subscription session driver.

use graph_client::{GraphClient, GraphError};
use mail_domain::{Email, MailAccount, Protocol};
use notification_bus::NotificationBus;
use token_provider::TokenProvider;

use crate::event::SubscribeEvent;
use crate::sink::EventSink;
use crate::{SessionError, SessionOutcome, SessionTimers};

/// Run one Graph subscription session end to end.
///
/// Creates the upstream push subscription, registers its id on the bus,
/// emits the `subscription` event, then waits for a pushed message id to
/// resolve into the delivered email. The bus channel and the upstream
/// subscription are released on every exit path.
pub async fn run_graph_session<S>(
    provider: &TokenProvider,
    account: &MailAccount,
    refresh_needed: bool,
    graph: &GraphClient,
    bus: &NotificationBus,
    notification_url: &str,
    timers: SessionTimers,
    sink: &mut S,
) -> Result<SessionOutcome, SessionError>
where
    S: EventSink,
{
    let (access_token, refresh_token) = provider.for_request(refresh_needed, account).await?;

    let created = graph
        .create_subscription(&access_token, notification_url)
        .await
        .map_err(SessionError::CreateSubscription)?;

    // The channel can only be registered once the upstream hands back the
    // subscription id; a push landing in that window is dropped by the bus
    // and the session ends in a timeout. In practice the first notification
    // arrives several seconds after creation.
    let mut notify_rx = bus.register(&created.id).await;

    tracing::info!(
        subscription_id = %created.id,
        email = %account.email,
        "Graph subscription started"
    );

    let fetch = {
        let graph = graph.clone();
        let access_token = access_token.clone();
        move |message_id: String| {
            let graph = graph.clone();
            let access_token = access_token.clone();
            async move { graph.get_email_by_id(&access_token, &message_id).await }
        }
    };

    let outcome = drive(sink, &mut notify_rx, refresh_needed, refresh_token, timers, fetch).await;

    bus.remove(&created.id).await;
    if let Err(error) = graph.delete_subscription(&access_token, &created.id).await {
        tracing::warn!(
            error = %error,
            subscription_id = %created.id,
            "failed to delete Graph subscription"
        );
    }

    tracing::info!(
        subscription_id = %created.id,
        email = %account.email,
        outcome = ?outcome,
        "Graph subscription cleaned up"
    );

    Ok(outcome)
}

/// What woke the event loop.
enum Tick {
    /// A pushed message id, or the bus channel closing.
    Source(Option<String>),

    /// Heartbeat cadence.
    Heartbeat,

    /// The session deadline passed.
    Deadline,

    /// The client stream is gone.
    ClientGone,
}

pub(crate) async fn drive<S, F, Fut>(
    sink: &mut S,
    notify_rx: &mut tokio::sync::mpsc::Receiver<String>,
    refresh_needed: bool,
    refresh_token: Option<String>,
    timers: SessionTimers,
    mut fetch: F,
) -> SessionOutcome
where
    S: EventSink,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Option<Email>, GraphError>>,
{
    if sink
        .emit(SubscribeEvent::subscribed(refresh_needed, refresh_token))
        .await
        .is_err()
    {
        return SessionOutcome::Disconnected;
    }

    let deadline = tokio::time::sleep(timers.deadline);
    tokio::pin!(deadline);
    let mut heartbeat = tokio::time::interval_at(
        tokio::time::Instant::now() + timers.heartbeat,
        timers.heartbeat,
    );
    let mut source_open = true;

    loop {
        let tick = tokio::select! {
            biased;
            maybe_id = notify_rx.recv(), if source_open => Tick::Source(maybe_id),
            _ = heartbeat.tick() => Tick::Heartbeat,
            _ = &mut deadline => Tick::Deadline,
            _ = sink.closed() => Tick::ClientGone,
        };

        match tick {
            Tick::Source(Some(message_id)) => {
                tracing::info!(message_id = %message_id, "resolving pushed message");
                // A failed lookup is reported and the session keeps
                // waiting; the next push or the deadline decides.
                let email = match fetch(message_id).await {
                    Ok(Some(email)) => email,
                    Ok(None) => {
                        let event = SubscribeEvent::Error {
                            message: "pushed message not found".to_string(),
                        };
                        if sink.emit(event).await.is_err() {
                            return SessionOutcome::Disconnected;
                        }
                        continue;
                    }
                    Err(error) => {
                        tracing::error!(error = %error, "failed to fetch pushed message");
                        let event = SubscribeEvent::Error {
                            message: error.to_string(),
                        };
                        if sink.emit(event).await.is_err() {
                            return SessionOutcome::Disconnected;
                        }
                        continue;
                    }
                };

                if sink.emit(SubscribeEvent::Email(email)).await.is_err() {
                    return SessionOutcome::Disconnected;
                }
                let complete = SubscribeEvent::Complete {
                    message: "email delivered (GRAPH)".to_string(),
                };
                if sink.emit(complete).await.is_err() {
                    return SessionOutcome::Disconnected;
                }
                return SessionOutcome::Delivered;
            }
            Tick::Source(None) => {
                tracing::warn!("notification channel closed before delivery");
                source_open = false;
            }
            Tick::Heartbeat => {
                if sink
                    .emit(SubscribeEvent::heartbeat_now(Protocol::Graph))
                    .await
                    .is_err()
                {
                    return SessionOutcome::Disconnected;
                }
            }
            Tick::Deadline => return SessionOutcome::TimedOut,
            Tick::ClientGone => return SessionOutcome::Disconnected,
        }
    }
}
