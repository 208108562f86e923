//! XOAUTH2-authenticated IMAP engine with IDLE-based new-mail delivery.

mod auth;
mod connect;
mod fetch;
mod gate;
mod listener;

use std::time::Duration;

use mail_domain::Email;

pub use crate::connect::{ConnectError, ConnectParams, Session, Stream, TlsMode};
pub use crate::gate::MailboxCounts;

/// How long a single IDLE cycle may wait before being re-issued.
const IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default host for Microsoft consumer mailboxes.
const OUTLOOK_IMAP_HOST: &str = "outlook.office365.com";

/// Default implicit-TLS IMAP port.
const OUTLOOK_IMAP_PORT: u16 = 993;

/// Errors returned by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Connecting or authenticating failed.
    #[error("connect: {0}")]
    Connect(#[from] ConnectError),

    /// A subscription was requested without a connection.
    #[error("not connected")]
    NotConnected,

    /// A second subscription was requested on one connection.
    #[error("already subscribed")]
    AlreadySubscribed,

    /// IMAP protocol error.
    #[error("IMAP error: {0}")]
    Imap(#[from] async_imap::error::Error),

    /// The requested Message-ID cannot appear in a search command.
    #[error("invalid Message-ID {0:?}")]
    InvalidMessageId(String),

    /// No message matched the requested Message-ID.
    #[error("no message with Message-ID {0}")]
    MessageNotFound(String),

    /// The server returned no body for a fetched message.
    #[error("fetch returned no message body")]
    EmptyFetch,

    /// The fetched message could not be parsed.
    #[error("mail parsing failed: {0}")]
    Parse(#[from] mail_parse::ParseMailError),
}

/// A running listener task and its stop signal.
struct Listener {
    /// Flipping this stops the listener.
    stop: tokio::sync::watch::Sender<bool>,

    /// Join handle of the listener task.
    handle: tokio::task::JoinHandle<()>,
}

/// Mutable engine state behind the connection lifecycle lock.
#[derive(Default)]
struct EngineState {
    /// The established session, when connected and not handed to a listener.
    session: Option<Session>,

    /// The running listener, when subscribed.
    listener: Option<Listener>,
}

/// One upstream IMAP connection with optional IDLE subscription.
///
/// Lifecycle operations (connect, subscribe, disconnect) serialize on an
/// internal lock; while subscribed the listener task owns the session
/// exclusively and the only producer of the email channel is that task.
pub struct ImapEngine {
    params: ConnectParams,
    state: tokio::sync::Mutex<EngineState>,
}

impl ImapEngine {
    /// Create an engine for the given connection parameters.
    pub fn new(params: ConnectParams) -> Self {
        Self {
            params,
            state: tokio::sync::Mutex::new(EngineState::default()),
        }
    }

    /// Create an engine for a Microsoft consumer mailbox.
    pub fn outlook(user: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self::new(ConnectParams {
            host: OUTLOOK_IMAP_HOST.to_string(),
            port: OUTLOOK_IMAP_PORT,
            tls_mode: TlsMode::Implicit,
            tls_server_name: OUTLOOK_IMAP_HOST.to_string(),
            user: user.into(),
            access_token: access_token.into(),
        })
    }

    /// Establish the connection, authenticate, and select `INBOX`.
    ///
    /// A no-op when already connected. Any step failing tears the
    /// half-open connection down before reporting.
    pub async fn connect(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;

        if state.session.is_some() || state.listener.is_some() {
            return Ok(());
        }

        let mut session = connect::establish(&self.params).await?;

        if let Err(error) = session.select("INBOX").await {
            let _ = session.logout().await;
            return Err(EngineError::Imap(error));
        }

        state.session = Some(session);
        Ok(())
    }

    /// Start the IDLE listener delivering the next new message.
    ///
    /// The listener takes ownership of the session and reacts to either
    /// cancellation source within one IDLE cycle: the session-level
    /// `cancel` or the engine's own stop signal raised by
    /// [`Self::disconnect`].
    pub async fn subscribe_new_emails(
        &self,
        email_tx: tokio::sync::mpsc::Sender<Email>,
        cancel: tokio::sync::watch::Receiver<bool>,
    ) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;

        if state.listener.is_some() {
            return Err(EngineError::AlreadySubscribed);
        }

        let session = state.session.take().ok_or(EngineError::NotConnected)?;
        let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);

        let handle = tokio::spawn(listener::run(listener::ListenerParams {
            session,
            email_tx,
            cancel,
            stop: stop_rx,
            idle_timeout: IDLE_TIMEOUT,
        }));

        state.listener = Some(Listener {
            stop: stop_tx,
            handle,
        });

        Ok(())
    }

    /// Stop the listener, wait for it to observe the stop, and log out.
    ///
    /// Idempotent; cleanup failures are logged, never surfaced.
    pub async fn disconnect(&self) {
        let mut state = self.state.lock().await;

        if let Some(listener) = state.listener.take() {
            let _ = listener.stop.send(true);
            if let Err(error) = listener.handle.await {
                tracing::warn!(error = %error, "failed to join the mail listener");
            }
        }

        if let Some(mut session) = state.session.take() {
            if let Err(error) = session.logout().await {
                tracing::warn!(error = %error, "IMAP logout failed");
            }
        }
    }

    /// Fetch the newest message in the inbox, if any.
    pub async fn fetch_latest_email(&self) -> Result<Option<Email>, EngineError> {
        self.fetch_latest_from_folder("inbox").await
    }

    /// Fetch the newest message in the junk folder, if any.
    pub async fn fetch_latest_junk_email(&self) -> Result<Option<Email>, EngineError> {
        self.fetch_latest_from_folder("junk").await
    }

    /// Fetch the message with the given Message-ID from the inbox.
    pub async fn fetch_email_by_id(&self, email_id: &str) -> Result<Email, EngineError> {
        let mut state = self.state.lock().await;
        let session = Self::ensure_session(&self.params, &mut state).await?;

        session.select("INBOX").await?;

        let sequence = fetch::search_by_message_id(session, email_id).await?;
        fetch::fetch_by_sequence(session, sequence)
            .await?
            .ok_or(EngineError::EmptyFetch)
    }

    async fn fetch_latest_from_folder(&self, folder: &str) -> Result<Option<Email>, EngineError> {
        let mut state = self.state.lock().await;
        let session = Self::ensure_session(&self.params, &mut state).await?;

        let mailbox = session.select(folder).await?;
        if mailbox.exists == 0 {
            tracing::debug!(folder, "folder is empty");
            return Ok(None);
        }

        fetch::fetch_by_sequence(session, mailbox.exists).await
    }

    /// Connect on demand for the request/response operations.
    async fn ensure_session<'a>(
        params: &ConnectParams,
        state: &'a mut EngineState,
    ) -> Result<&'a mut Session, EngineError> {
        if state.session.is_none() {
            state.session = Some(connect::establish(params).await?);
        }
        state.session.as_mut().ok_or(EngineError::NotConnected)
    }
}
