//! OAuth2 refresh-token grants against the upstream identity provider.

use mail_domain::{MailAccount, ServiceProvider};
use oauth2::TokenResponse as _;

/// Microsoft consumer-account token endpoint.
const MICROSOFT_TOKEN_URL: &str =
    "https://login.microsoftonline.com/consumers/oauth2/v2.0/token";

/// Scope requesting a Graph-API-capable access token.
const GRAPH_DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Which flavor of access token a refresh call should yield.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RefreshVariant {
    /// Request the Graph `.default` scope; the access token works against
    /// the Graph HTTP API.
    Scoped,

    /// No explicit scope; the access token works for IMAP XOAUTH2 and the
    /// response may carry a rotated refresh credential.
    Unscoped,
}

/// Tokens returned by a single refresh call.
///
/// Consumed immediately; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBundle {
    /// The access token; non-empty on success.
    pub access_token: String,

    /// Rotated refresh credential, when the upstream rotates it.
    pub refresh_token: Option<String>,

    /// Granted scope string, space separated.
    pub scope: Option<String>,

    /// Upstream-reported access token lifetime.
    pub expires_in: Option<std::time::Duration>,

    /// Token type, typically `Bearer`.
    pub token_type: String,
}

/// The error type of a refresh-token exchange.
pub type ExchangeError = oauth2::RequestTokenError<
    oauth2::HttpClientError<reqwest::Error>,
    oauth2::StandardErrorResponse<oauth2::basic::BasicErrorResponseType>,
>;

/// An error that can occur while refreshing tokens.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    /// The account's provider has no refresher.
    #[error("unsupported service provider: {0}")]
    UnsupportedProvider(ServiceProvider),

    /// Exchanging the refresh token failed.
    #[error("unable to exchange refresh token: {0}")]
    Exchange(#[from] Box<ExchangeError>),

    /// The upstream answered without an access token.
    #[error("no access token in refresh response")]
    EmptyAccessToken,
}

/// Upstream token refresher.
#[async_trait::async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Perform one refresh-token grant for the account.
    async fn refresh(
        &self,
        account: &MailAccount,
        variant: RefreshVariant,
    ) -> Result<TokenBundle, RefreshError>;
}

#[async_trait::async_trait]
impl<T> TokenRefresher for std::sync::Arc<T>
where
    T: TokenRefresher + ?Sized,
{
    async fn refresh(
        &self,
        account: &MailAccount,
        variant: RefreshVariant,
    ) -> Result<TokenBundle, RefreshError> {
        (**self).refresh(account, variant).await
    }
}

/// Refresher for Microsoft consumer accounts.
pub struct MicrosoftRefresher {
    /// The HTTP client used for token exchanges.
    http_client: reqwest::Client,

    /// The token endpoint.
    token_url: oauth2::TokenUrl,
}

impl MicrosoftRefresher {
    /// Create a refresher over the given HTTP client.
    pub fn new(http_client: reqwest::Client) -> Result<Self, oauth2::url::ParseError> {
        Ok(Self {
            http_client,
            token_url: oauth2::TokenUrl::new(MICROSOFT_TOKEN_URL.to_string())?,
        })
    }
}

#[async_trait::async_trait]
impl TokenRefresher for MicrosoftRefresher {
    async fn refresh(
        &self,
        account: &MailAccount,
        variant: RefreshVariant,
    ) -> Result<TokenBundle, RefreshError> {
        if account.service_provider != ServiceProvider::Microsoft {
            return Err(RefreshError::UnsupportedProvider(account.service_provider));
        }

        let oauth2_client =
            oauth2::basic::BasicClient::new(oauth2::ClientId::new(account.client_id.clone()))
                .set_token_uri(self.token_url.clone());

        let refresh_token = oauth2::RefreshToken::new(account.refresh_token.clone());
        let mut request = oauth2_client.exchange_refresh_token(&refresh_token);
        if variant == RefreshVariant::Scoped {
            request = request.add_scope(oauth2::Scope::new(GRAPH_DEFAULT_SCOPE.to_string()));
        }

        let response = request
            .request_async(&self.http_client)
            .await
            .map_err(Box::new)?;

        let access_token = response.access_token().secret().clone();
        if access_token.is_empty() {
            return Err(RefreshError::EmptyAccessToken);
        }

        let bundle = TokenBundle {
            access_token,
            refresh_token: response.refresh_token().map(|token| token.secret().clone()),
            scope: response.scopes().map(|scopes| {
                scopes
                    .iter()
                    .map(|scope| scope.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            }),
            expires_in: response.expires_in(),
            token_type: token_type_name(response.token_type()),
        };

        tracing::info!(
            email = %account.email,
            has_refresh_token = bundle.refresh_token.is_some(),
            expires_in = ?bundle.expires_in,
            "token refresh succeeded"
        );

        Ok(bundle)
    }
}

/// Run the scoped and unscoped variants concurrently and join both.
///
/// The scoped response supplies the Graph access token, the unscoped one the
/// rotated refresh credential. The access-side error wins when both fail.
pub async fn refresh_both_concurrently<R>(
    refresher: &R,
    account: &MailAccount,
) -> Result<(String, Option<String>), RefreshError>
where
    R: TokenRefresher + ?Sized,
{
    let (scoped, unscoped) = tokio::join!(
        refresher.refresh(account, RefreshVariant::Scoped),
        refresher.refresh(account, RefreshVariant::Unscoped),
    );

    let scoped = scoped?;
    let unscoped = unscoped?;

    Ok((scoped.access_token, unscoped.refresh_token))
}

fn token_type_name(token_type: &oauth2::basic::BasicTokenType) -> String {
    match token_type {
        oauth2::basic::BasicTokenType::Bearer => "Bearer".to_string(),
        oauth2::basic::BasicTokenType::Mac => "MAC".to_string(),
        other => format!("{other:?}"),
    }
}
