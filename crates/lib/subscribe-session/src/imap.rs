//! IMAP subscription session driver.

use mail_domain::{Email, MailAccount, Protocol};
use token_provider::TokenProvider;

use crate::event::SubscribeEvent;
use crate::sink::EventSink;
use crate::{SessionError, SessionOutcome, SessionTimers, generate_subscription_id};

/// Run one IMAP subscription session end to end.
///
/// Resolves tokens, connects and subscribes the engine, emits the
/// `subscription` event, then waits for the one message. The engine is
/// torn down on every exit path.
pub async fn run_imap_session<S>(
    provider: &TokenProvider,
    account: &MailAccount,
    refresh_needed: bool,
    timers: SessionTimers,
    sink: &mut S,
) -> Result<SessionOutcome, SessionError>
where
    S: EventSink,
{
    let (access_token, refresh_token) = provider.for_request(refresh_needed, account).await?;

    let subscription_id = generate_subscription_id();
    let engine = imap_engine::ImapEngine::outlook(&account.email, &access_token);

    let (email_tx, mut email_rx) = tokio::sync::mpsc::channel(1);
    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);

    engine.connect().await?;
    if let Err(error) = engine.subscribe_new_emails(email_tx, cancel_rx).await {
        engine.disconnect().await;
        return Err(error.into());
    }

    tracing::info!(
        subscription_id = %subscription_id,
        email = %account.email,
        "IMAP subscription started"
    );

    let outcome = drive(sink, &mut email_rx, refresh_needed, refresh_token, timers).await;

    let _ = cancel_tx.send(true);
    engine.disconnect().await;

    tracing::info!(
        subscription_id = %subscription_id,
        email = %account.email,
        outcome = ?outcome,
        "IMAP subscription cleaned up"
    );

    Ok(outcome)
}

/// What woke the event loop.
enum Tick {
    /// The listener delivered a message, or its channel closed.
    Source(Option<Email>),

    /// Heartbeat cadence.
    Heartbeat,

    /// The session deadline passed.
    Deadline,

    /// The client stream is gone.
    ClientGone,
}

pub(crate) async fn drive<S>(
    sink: &mut S,
    email_rx: &mut tokio::sync::mpsc::Receiver<Email>,
    refresh_needed: bool,
    refresh_token: Option<String>,
    timers: SessionTimers,
) -> SessionOutcome
where
    S: EventSink,
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
            maybe_email = email_rx.recv(), if source_open => Tick::Source(maybe_email),
            _ = heartbeat.tick() => Tick::Heartbeat,
            _ = &mut deadline => Tick::Deadline,
            _ = sink.closed() => Tick::ClientGone,
        };

        match tick {
            Tick::Source(Some(email)) => {
                tracing::info!(message_id = %email.id, "delivering new message");
                if sink.emit(SubscribeEvent::Email(email)).await.is_err() {
                    return SessionOutcome::Disconnected;
                }
                let complete = SubscribeEvent::Complete {
                    message: "email delivered (IMAP)".to_string(),
                };
                if sink.emit(complete).await.is_err() {
                    return SessionOutcome::Disconnected;
                }
                return SessionOutcome::Delivered;
            }
            Tick::Source(None) => {
                // The listener died; the session keeps waiting so the
                // deadline still produces a proper timeout for the client.
                tracing::warn!("email source closed before delivery");
                source_open = false;
            }
            Tick::Heartbeat => {
                if sink
                    .emit(SubscribeEvent::heartbeat_now(Protocol::Imap))
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
