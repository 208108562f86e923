//! Access and refresh token acquisition over the cache and the upstream
//! refresher.

use std::sync::Arc;
use std::time::Duration;

use mail_domain::{MailAccount, Protocol};
use token_cache_core::TokenCache;
use token_refresh::{RefreshError, RefreshVariant, TokenRefresher};

/// TTL for cached access tokens.
///
/// Upstream tokens live for an hour; ten minutes of slack keeps a cache hit
/// from handing out a token about to expire.
const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(50 * 60);

/// An error that can occur while providing tokens.
#[derive(Debug, thiserror::Error)]
pub enum TokenProviderError {
    /// The account protocol is not resolved yet.
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(Protocol),

    /// The upstream refresh call failed.
    #[error("token refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    /// A rotation was requested but the upstream returned no refresh token.
    #[error("no refresh token in refresh response")]
    NoRefreshToken,
}

/// Token provider coordinating the cache and the upstream refresher.
#[derive(Clone)]
pub struct TokenProvider {
    cache: Arc<dyn TokenCache>,
    refresher: Arc<dyn TokenRefresher>,
}

impl TokenProvider {
    /// Create a provider over a cache and a refresher.
    pub fn new(cache: Arc<dyn TokenCache>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self { cache, refresher }
    }

    /// Obtain an access token, preferring the cache.
    ///
    /// A cache miss triggers an upstream refresh whose result is written back
    /// with [`ACCESS_TOKEN_TTL`]; a failed cache write never fails the call.
    pub async fn get_access_token(
        &self,
        account: &MailAccount,
    ) -> Result<String, TokenProviderError> {
        if let Ok(token) = self.cache.get_access_token(&account.refresh_token).await {
            tracing::debug!(email = %account.email, "access token served from cache");
            return Ok(token);
        }

        tracing::info!(email = %account.email, "access token cache miss, refreshing upstream");

        let variant = access_variant(account.protocol)?;
        let bundle = self.refresher.refresh(account, variant).await?;

        self.cache_access_token(account, &bundle.access_token).await;

        Ok(bundle.access_token)
    }

    /// Obtain a rotated refresh token, always calling upstream.
    ///
    /// The cache is bypassed; the unscoped variant is used regardless of the
    /// account protocol since only it rotates the credential.
    pub async fn get_refresh_token(
        &self,
        account: &MailAccount,
    ) -> Result<String, TokenProviderError> {
        let bundle = self
            .refresher
            .refresh(account, RefreshVariant::Unscoped)
            .await?;

        bundle
            .refresh_token
            .filter(|token| !token.is_empty())
            .ok_or(TokenProviderError::NoRefreshToken)
    }

    /// Obtain both tokens, always calling upstream.
    ///
    /// For IMAP a single unscoped call yields both. For GRAPH the scoped
    /// (access) and unscoped (refresh) calls run concurrently and both must
    /// succeed. The access token is written back to the cache either way.
    pub async fn get_both_tokens(
        &self,
        account: &MailAccount,
    ) -> Result<(String, Option<String>), TokenProviderError> {
        let (access_token, refresh_token) = match account.protocol {
            Protocol::Imap => {
                let bundle = self
                    .refresher
                    .refresh(account, RefreshVariant::Unscoped)
                    .await?;
                (bundle.access_token, bundle.refresh_token)
            }
            Protocol::Graph => {
                token_refresh::refresh_both_concurrently(self.refresher.as_ref(), account).await?
            }
            Protocol::Unknown => {
                return Err(TokenProviderError::UnsupportedProtocol(account.protocol));
            }
        };

        self.cache_access_token(account, &access_token).await;

        tracing::info!(
            email = %account.email,
            has_new_refresh_token = refresh_token.is_some(),
            "obtained access and refresh tokens"
        );

        Ok((access_token, refresh_token))
    }

    /// Resolve tokens for a subscription or fetch request.
    ///
    /// `refresh_needed` selects rotation: both tokens are fetched upstream
    /// and the new refresh credential is returned to the caller. Otherwise
    /// only an access token is resolved, cache first.
    pub async fn for_request(
        &self,
        refresh_needed: bool,
        account: &MailAccount,
    ) -> Result<(String, Option<String>), TokenProviderError> {
        if refresh_needed {
            self.get_both_tokens(account).await
        } else {
            let access_token = self.get_access_token(account).await?;
            Ok((access_token, None))
        }
    }

    /// Release the cache backend.
    pub async fn close(&self) {
        if let Err(error) = self.cache.close().await {
            tracing::warn!(error = %error, "failed to close token cache");
        }
    }

    async fn cache_access_token(&self, account: &MailAccount, access_token: &str) {
        if let Err(error) = self
            .cache
            .set_access_token(&account.refresh_token, access_token, ACCESS_TOKEN_TTL)
            .await
        {
            tracing::warn!(
                error = %error,
                email = %account.email,
                "failed to cache access token"
            );
        }
    }
}

fn access_variant(protocol: Protocol) -> Result<RefreshVariant, TokenProviderError> {
    match protocol {
        Protocol::Imap => Ok(RefreshVariant::Unscoped),
        Protocol::Graph => Ok(RefreshVariant::Scoped),
        Protocol::Unknown => Err(TokenProviderError::UnsupportedProtocol(protocol)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use mail_domain::ServiceProvider;
    use token_cache_core::CacheError;
    use token_refresh::TokenBundle;

    use super::*;

    fn account(protocol: Protocol) -> MailAccount {
        MailAccount {
            email: "user@example.com".to_string(),
            client_id: "client".to_string(),
            refresh_token: "refresh-credential".to_string(),
            protocol,
            service_provider: ServiceProvider::Microsoft,
        }
    }

    fn bundle(access: &str, refresh: Option<&str>) -> TokenBundle {
        TokenBundle {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            scope: None,
            expires_in: Some(Duration::from_secs(3600)),
            token_type: "Bearer".to_string(),
        }
    }

    /// Refresher answering from a script and recording the variants used.
    struct StubRefresher {
        calls: Mutex<Vec<RefreshVariant>>,
        scoped: Result<TokenBundle, ()>,
        unscoped: Result<TokenBundle, ()>,
    }

    impl StubRefresher {
        fn new(scoped: Result<TokenBundle, ()>, unscoped: Result<TokenBundle, ()>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                scoped,
                unscoped,
            })
        }

        fn calls(&self) -> Vec<RefreshVariant> {
            self.calls.lock().expect("stub refresher mutex poisoned").clone()
        }
    }

    #[async_trait::async_trait]
    impl TokenRefresher for StubRefresher {
        async fn refresh(
            &self,
            _account: &MailAccount,
            variant: RefreshVariant,
        ) -> Result<TokenBundle, RefreshError> {
            self.calls
                .lock()
                .expect("stub refresher mutex poisoned")
                .push(variant);
            let result = match variant {
                RefreshVariant::Scoped => &self.scoped,
                RefreshVariant::Unscoped => &self.unscoped,
            };
            result.clone().map_err(|()| RefreshError::EmptyAccessToken)
        }
    }

    /// In-memory cache; writes can be scripted to fail.
    #[derive(Default)]
    struct StubCache {
        entries: Mutex<HashMap<String, String>>,
        fail_writes: bool,
    }

    #[async_trait::async_trait]
    impl TokenCache for StubCache {
        async fn get_access_token(&self, refresh_token: &str) -> Result<String, CacheError> {
            self.entries
                .lock()
                .expect("stub cache mutex poisoned")
                .get(refresh_token)
                .cloned()
                .ok_or(CacheError::Miss)
        }

        async fn set_access_token(
            &self,
            refresh_token: &str,
            access_token: &str,
            _ttl: Duration,
        ) -> Result<(), CacheError> {
            if self.fail_writes {
                return Err(CacheError::Backend("write refused".into()));
            }
            self.entries
                .lock()
                .expect("stub cache mutex poisoned")
                .insert(refresh_token.to_string(), access_token.to_string());
            Ok(())
        }

        async fn close(&self) -> Result<(), CacheError> {
            Ok(())
        }
    }

    fn provider(
        cache: Arc<StubCache>,
        refresher: Arc<StubRefresher>,
    ) -> TokenProvider {
        TokenProvider::new(cache, refresher)
    }

    #[tokio::test]
    async fn cache_hit_skips_the_refresher() {
        let cache = Arc::new(StubCache::default());
        cache
            .set_access_token("refresh-credential", "cached-access", Duration::from_secs(60))
            .await
            .expect("seeding the cache should succeed");
        let refresher = StubRefresher::new(Ok(bundle("a", None)), Ok(bundle("a", None)));
        let provider = provider(cache, refresher.clone());

        let token = provider
            .get_access_token(&account(Protocol::Imap))
            .await
            .expect("cache hit should succeed");

        assert_eq!(token, "cached-access");
        assert!(refresher.calls().is_empty());
    }

    #[tokio::test]
    async fn cache_miss_refreshes_and_populates_cache() {
        let cache = Arc::new(StubCache::default());
        let refresher =
            StubRefresher::new(Ok(bundle("scoped-access", None)), Ok(bundle("imap-access", None)));
        let provider = provider(cache.clone(), refresher.clone());

        let token = provider
            .get_access_token(&account(Protocol::Imap))
            .await
            .expect("refresh should succeed");

        assert_eq!(token, "imap-access");
        assert_eq!(refresher.calls(), vec![RefreshVariant::Unscoped]);
        assert_eq!(
            cache
                .get_access_token("refresh-credential")
                .await
                .expect("cache should hold the refreshed token"),
            "imap-access"
        );
    }

    #[tokio::test]
    async fn graph_access_uses_the_scoped_variant() {
        let cache = Arc::new(StubCache::default());
        let refresher =
            StubRefresher::new(Ok(bundle("scoped-access", None)), Ok(bundle("imap-access", None)));
        let provider = provider(cache, refresher.clone());

        let token = provider
            .get_access_token(&account(Protocol::Graph))
            .await
            .expect("refresh should succeed");

        assert_eq!(token, "scoped-access");
        assert_eq!(refresher.calls(), vec![RefreshVariant::Scoped]);
    }

    #[tokio::test]
    async fn unknown_protocol_is_rejected_before_any_upstream_call() {
        let cache = Arc::new(StubCache::default());
        let refresher = StubRefresher::new(Ok(bundle("a", None)), Ok(bundle("a", None)));
        let provider = provider(cache, refresher.clone());

        let result = provider.get_access_token(&account(Protocol::Unknown)).await;

        assert!(matches!(result, Err(TokenProviderError::UnsupportedProtocol(_))));
        assert!(refresher.calls().is_empty());
    }

    #[tokio::test]
    async fn cache_write_failure_does_not_fail_the_call() {
        let cache = Arc::new(StubCache {
            fail_writes: true,
            ..StubCache::default()
        });
        let refresher =
            StubRefresher::new(Ok(bundle("scoped-access", None)), Ok(bundle("imap-access", None)));
        let provider = provider(cache, refresher);

        let token = provider
            .get_access_token(&account(Protocol::Imap))
            .await
            .expect("a failed cache write must not surface");
        assert_eq!(token, "imap-access");
    }

    #[tokio::test]
    async fn refresh_token_bypasses_the_cache_and_stays_unscoped() {
        let cache = Arc::new(StubCache::default());
        cache
            .set_access_token("refresh-credential", "cached-access", Duration::from_secs(60))
            .await
            .expect("seeding the cache should succeed");
        let refresher = StubRefresher::new(
            Ok(bundle("scoped-access", Some("scoped-rotation"))),
            Ok(bundle("imap-access", Some("new-rotation"))),
        );
        let provider = provider(cache, refresher.clone());

        let token = provider
            .get_refresh_token(&account(Protocol::Graph))
            .await
            .expect("rotation should succeed");

        assert_eq!(token, "new-rotation");
        assert_eq!(refresher.calls(), vec![RefreshVariant::Unscoped]);
    }

    #[tokio::test]
    async fn missing_rotation_is_an_error() {
        let cache = Arc::new(StubCache::default());
        let refresher =
            StubRefresher::new(Ok(bundle("a", None)), Ok(bundle("imap-access", None)));
        let provider = provider(cache, refresher);

        let result = provider.get_refresh_token(&account(Protocol::Imap)).await;
        assert!(matches!(result, Err(TokenProviderError::NoRefreshToken)));
    }

    #[tokio::test]
    async fn both_tokens_for_imap_come_from_one_unscoped_call() {
        let cache = Arc::new(StubCache::default());
        let refresher = StubRefresher::new(
            Ok(bundle("scoped-access", None)),
            Ok(bundle("imap-access", Some("rotated"))),
        );
        let provider = provider(cache.clone(), refresher.clone());

        let (access, refresh) = provider
            .get_both_tokens(&account(Protocol::Imap))
            .await
            .expect("refresh should succeed");

        assert_eq!(access, "imap-access");
        assert_eq!(refresh.as_deref(), Some("rotated"));
        assert_eq!(refresher.calls(), vec![RefreshVariant::Unscoped]);
        assert_eq!(
            cache
                .get_access_token("refresh-credential")
                .await
                .expect("cache should hold the access token"),
            "imap-access"
        );
    }

    #[tokio::test]
    async fn both_tokens_for_graph_join_scoped_and_unscoped_calls() {
        let cache = Arc::new(StubCache::default());
        let refresher = StubRefresher::new(
            Ok(bundle("scoped-access", Some("ignored"))),
            Ok(bundle("imap-access", Some("rotated"))),
        );
        let provider = provider(cache, refresher.clone());

        let (access, refresh) = provider
            .get_both_tokens(&account(Protocol::Graph))
            .await
            .expect("refresh should succeed");

        assert_eq!(access, "scoped-access");
        assert_eq!(refresh.as_deref(), Some("rotated"));

        let mut calls = refresher.calls();
        calls.sort_by_key(|variant| *variant == RefreshVariant::Unscoped);
        assert_eq!(calls, vec![RefreshVariant::Scoped, RefreshVariant::Unscoped]);
    }

    #[tokio::test]
    async fn request_without_rotation_only_resolves_access() {
        let cache = Arc::new(StubCache::default());
        let refresher = StubRefresher::new(
            Ok(bundle("scoped-access", None)),
            Ok(bundle("imap-access", Some("rotated"))),
        );
        let provider = provider(cache, refresher);

        let (access, refresh) = provider
            .for_request(false, &account(Protocol::Imap))
            .await
            .expect("request should succeed");

        assert_eq!(access, "imap-access");
        assert_eq!(refresh, None);
    }
}
