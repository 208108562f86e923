//! Unary mail operations shared by the REST and gRPC surfaces.

use imap_engine::ImapEngine;
use mail_domain::{Email, MailAccount, Protocol};

use crate::state::AppState;

/// An error from a unary operation.
#[derive(Debug, thiserror::Error)]
pub enum OpError {
    /// The request is malformed.
    #[error("{0}")]
    InvalidInput(String),

    /// Token acquisition failed.
    #[error("token acquisition failed: {0}")]
    Token(#[from] token_provider::TokenProviderError),

    /// The IMAP backend failed.
    #[error("IMAP backend: {0}")]
    Imap(#[from] imap_engine::EngineError),

    /// The Graph backend failed.
    #[error("Graph backend: {0}")]
    Graph(#[from] graph_client::GraphError),
}

/// Fetch the newest inbox message, optionally rotating the credential.
pub async fn latest_mail(
    state: &AppState,
    account: &MailAccount,
    refresh_needed: bool,
) -> Result<(Option<Email>, Option<String>), OpError> {
    let (access_token, new_refresh_token) =
        state.provider.for_request(refresh_needed, account).await?;

    let email = match account.protocol {
        Protocol::Imap => {
            let engine = ImapEngine::outlook(&account.email, &access_token);
            let result = engine.fetch_latest_email().await;
            engine.disconnect().await;
            result?
        }
        Protocol::Graph => state.graph.get_latest_email(&access_token).await?,
        Protocol::Unknown => {
            return Err(OpError::InvalidInput(format!(
                "unsupported protocol: {}",
                account.protocol
            )));
        }
    };

    Ok((email, new_refresh_token))
}

/// Fetch a message by its identifier.
///
/// For IMAP the identifier is a Message-ID header value; for Graph it is
/// the upstream message id.
pub async fn find_mail_by_id(
    state: &AppState,
    account: &MailAccount,
    email_id: &str,
) -> Result<Option<Email>, OpError> {
    if email_id.is_empty() {
        return Err(OpError::InvalidInput("emailId must not be empty".to_string()));
    }

    let access_token = state.provider.get_access_token(account).await?;

    let email = match account.protocol {
        Protocol::Imap => {
            let engine = ImapEngine::outlook(&account.email, &access_token);
            let result = engine.fetch_email_by_id(email_id).await;
            engine.disconnect().await;
            Some(result?)
        }
        Protocol::Graph => state.graph.get_email_by_id(&access_token, email_id).await?,
        Protocol::Unknown => {
            return Err(OpError::InvalidInput(format!(
                "unsupported protocol: {}",
                account.protocol
            )));
        }
    };

    Ok(email)
}

/// Fetch the newest junk message.
pub async fn latest_junk_mail(
    state: &AppState,
    account: &MailAccount,
) -> Result<Option<Email>, OpError> {
    let access_token = state.provider.get_access_token(account).await?;

    let email = match account.protocol {
        Protocol::Imap => {
            let engine = ImapEngine::outlook(&account.email, &access_token);
            let result = engine.fetch_latest_junk_email().await;
            engine.disconnect().await;
            result?
        }
        Protocol::Graph => state.graph.get_latest_junk_email(&access_token).await?,
        Protocol::Unknown => {
            return Err(OpError::InvalidInput(format!(
                "unsupported protocol: {}",
                account.protocol
            )));
        }
    };

    Ok(email)
}

/// Rotate one refresh credential.
pub async fn refresh_token(state: &AppState, account: &MailAccount) -> Result<String, OpError> {
    if account.refresh_token.is_empty() {
        return Err(OpError::InvalidInput("refreshToken must not be empty".to_string()));
    }
    Ok(state.provider.get_refresh_token(account).await?)
}

/// Per-account outcome of a batch rotation.
#[derive(Debug, Clone)]
pub struct BatchRefreshResult {
    /// The account's mailbox address.
    pub email: String,

    /// The rotated credential on success.
    pub new_refresh_token: Option<String>,

    /// Error message on failure.
    pub error: Option<String>,
}

/// Aggregate outcome of a batch rotation.
#[derive(Debug, Clone, Default)]
pub struct BatchRefreshOutcome {
    /// How many rotations succeeded.
    pub success_count: usize,

    /// How many rotations failed.
    pub fail_count: usize,

    /// Per-account results, in completion order.
    pub results: Vec<BatchRefreshResult>,
}

/// Rotate a list of refresh credentials, one concurrent call per account.
pub async fn batch_refresh_token(state: &AppState, accounts: Vec<MailAccount>) -> BatchRefreshOutcome {
    let mut join_set = tokio::task::JoinSet::new();
    for account in accounts {
        let provider = state.provider.clone();
        join_set.spawn(async move {
            let result = provider.get_refresh_token(&account).await;
            (account.email, result)
        });
    }

    let mut outcome = BatchRefreshOutcome::default();
    while let Some(joined) = join_set.join_next().await {
        let Ok((email, result)) = joined else {
            outcome.fail_count += 1;
            continue;
        };

        match result {
            Ok(new_refresh_token) => {
                outcome.success_count += 1;
                outcome.results.push(BatchRefreshResult {
                    email,
                    new_refresh_token: Some(new_refresh_token),
                    error: None,
                });
            }
            Err(error) => {
                tracing::error!(error = %error, email = %email, "batch token rotation entry failed");
                outcome.fail_count += 1;
                outcome.results.push(BatchRefreshResult {
                    email,
                    new_refresh_token: None,
                    error: Some(error.to_string()),
                });
            }
        }
    }

    tracing::info!(
        success = outcome.success_count,
        fail = outcome.fail_count,
        "batch token rotation complete"
    );

    outcome
}
