//! IDLE listener task.

use std::time::{Duration, Instant};

use async_imap::extensions::idle::IdleResponse;
use futures_util::FutureExt as _;
use mail_domain::Email;

use crate::EngineError;
use crate::connect::Session;
use crate::gate::{DEDUP_WINDOW, MailboxCounts, NotificationGate};

/// The mailbox the listener watches.
const LISTEN_MAILBOX: &str = "INBOX";

/// Inputs for one listener task.
pub(crate) struct ListenerParams {
    /// The authenticated session with `INBOX` selected; owned by the
    /// listener until it exits.
    pub session: Session,

    /// Where the delivered message goes.
    pub email_tx: tokio::sync::mpsc::Sender<Email>,

    /// Session-level cancellation (client gone, deadline hit).
    pub cancel: tokio::sync::watch::Receiver<bool>,

    /// Subscription stop signal from the engine.
    pub stop: tokio::sync::watch::Receiver<bool>,

    /// How long a single IDLE cycle may sit idle before re-issuing.
    pub idle_timeout: Duration,
}

/// Run the listener, isolating panics from the rest of the process.
pub(crate) async fn run(params: ListenerParams) {
    let result = std::panic::AssertUnwindSafe(listen(params)).catch_unwind().await;
    match result {
        Ok(Ok(())) => tracing::debug!("mail listener exited"),
        Ok(Err(error)) => tracing::warn!(error = %error, "mail listener aborted"),
        Err(_panic_payload) => tracing::error!("mail listener panicked"),
    }
}

/// What woke the listener out of an IDLE cycle.
enum Wake {
    /// The IDLE wait resolved.
    Idle(IdleResponse),

    /// A cancellation source fired.
    Cancelled,
}

/// IDLE until a legitimate new-message notification arrives, deliver the
/// message once, and log out.
async fn listen(params: ListenerParams) -> Result<(), EngineError> {
    let ListenerParams {
        mut session,
        email_tx,
        mut cancel,
        mut stop,
        idle_timeout,
    } = params;

    let mut gate = NotificationGate::new(DEDUP_WINDOW);

    loop {
        let mut idle = session.idle();
        idle.init().await?;

        let (idle_wait, interrupt) = idle.wait_with_timeout(idle_timeout);
        let wake = tokio::select! {
            result = idle_wait => Wake::Idle(result?),
            _ = cancel.changed() => Wake::Cancelled,
            _ = stop.changed() => Wake::Cancelled,
        };
        drop(interrupt);
        session = idle.done().await?;

        let response = match wake {
            Wake::Cancelled => {
                tracing::debug!("listener cancelled, logging out");
                let _ = session.logout().await;
                return Ok(());
            }
            Wake::Idle(response) => response,
        };

        match response {
            IdleResponse::Timeout | IdleResponse::ManualInterrupt => continue,
            IdleResponse::NewData(_) => {}
        }

        let status = session.status(LISTEN_MAILBOX, "(MESSAGES RECENT)").await?;
        let counts = MailboxCounts {
            messages: status.exists,
            recent: status.recent,
        };

        if !gate.admit(counts, Instant::now()) {
            tracing::debug!(
                messages = counts.messages,
                recent = counts.recent,
                "spurious IDLE notification, skipping fetch"
            );
            continue;
        }

        tracing::info!(
            messages = counts.messages,
            recent = counts.recent,
            "mailbox changed, fetching newest message"
        );

        let Some(email) = crate::fetch::fetch_by_sequence(&mut session, counts.messages).await?
        else {
            tracing::debug!("no message at the reported sequence, re-entering IDLE");
            continue;
        };

        // Hand off without blocking teardown: a cancellation racing the
        // delivery wins and the message is dropped.
        tokio::select! {
            result = email_tx.send(email) => {
                if result.is_err() {
                    tracing::debug!("email consumer gone before delivery");
                }
            }
            _ = cancel.changed() => {}
            _ = stop.changed() => {}
        }

        let _ = session.logout().await;
        return Ok(());
    }
}
