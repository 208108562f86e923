//! Backend protocol detection from granted token scopes.

use std::sync::Arc;
use std::time::Duration;

use mail_domain::{MailAccount, Protocol, ServiceProvider};
use token_cache_core::TokenCache;
use token_refresh::{RefreshError, RefreshVariant, TokenRefresher};

/// Scope marker present when the account grants Graph mail access.
const GRAPH_MAIL_SCOPE: &str = "https://graph.microsoft.com/Mail.ReadWrite";

/// TTL for access tokens cached as a detection side effect.
const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(50 * 60);

/// An error that can occur while detecting the protocol.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    /// A required request field is empty.
    #[error("{0} must not be empty")]
    MissingField(&'static str),

    /// Only Microsoft accounts can be classified.
    #[error("unsupported service provider: {0}")]
    UnsupportedProvider(ServiceProvider),

    /// The scoped refresh call failed.
    #[error("token refresh failed: {0}")]
    Refresh(#[from] RefreshError),
}

/// Outcome of one detection.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ProtocolDetection {
    /// The detected backend protocol.
    pub protocol: Protocol,
}

/// Per-account outcome of a batch detection.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchDetectResult {
    /// The account's mailbox address.
    pub email: String,

    /// Detected protocol on success.
    pub protocol: Option<Protocol>,

    /// Error message on failure.
    pub error: Option<String>,
}

/// Aggregate outcome of a batch detection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchDetectOutcome {
    /// How many accounts were classified.
    pub success_count: usize,

    /// How many accounts failed.
    pub fail_count: usize,

    /// Per-account results, in completion order.
    pub results: Vec<BatchDetectResult>,
}

/// Detector classifying accounts by the scope a scoped refresh grants.
#[derive(Clone)]
pub struct ProtocolDetector {
    cache: Arc<dyn TokenCache>,
    refresher: Arc<dyn TokenRefresher>,
}

impl ProtocolDetector {
    /// Create a detector over a cache and a refresher.
    pub fn new(cache: Arc<dyn TokenCache>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self { cache, refresher }
    }

    /// Classify one account.
    ///
    /// A scoped refresh is issued; the account is GRAPH when the granted
    /// scope carries the Graph mail permission, IMAP otherwise. On GRAPH
    /// detection the access token is cached so the follow-up fetch does not
    /// pay for a second refresh.
    pub async fn detect(&self, account: &MailAccount) -> Result<ProtocolDetection, DetectError> {
        validate(account)?;

        tracing::info!(
            email = %account.email,
            provider = %account.service_provider,
            "detecting backend protocol"
        );

        let bundle = self
            .refresher
            .refresh(account, RefreshVariant::Scoped)
            .await?;

        let scope = bundle.scope.unwrap_or_default();
        let protocol = if is_graph_scope(&scope) {
            if let Err(error) = self
                .cache
                .set_access_token(&account.refresh_token, &bundle.access_token, ACCESS_TOKEN_TTL)
                .await
            {
                tracing::warn!(
                    error = %error,
                    email = %account.email,
                    "failed to cache detected access token"
                );
            }
            Protocol::Graph
        } else {
            Protocol::Imap
        };

        tracing::info!(
            email = %account.email,
            detected = %protocol,
            scope = %scope,
            "protocol detection complete"
        );

        Ok(ProtocolDetection { protocol })
    }

    /// Classify a list of accounts, one concurrent detection per account.
    pub async fn detect_batch(&self, accounts: Vec<MailAccount>) -> BatchDetectOutcome {
        if accounts.is_empty() {
            return BatchDetectOutcome::default();
        }

        tracing::info!(count = accounts.len(), "starting batch protocol detection");

        let mut join_set = tokio::task::JoinSet::new();
        for account in accounts {
            let detector = self.clone();
            join_set.spawn(async move {
                let result = detector.detect(&account).await;
                (account.email, result)
            });
        }

        let mut outcome = BatchDetectOutcome::default();
        while let Some(joined) = join_set.join_next().await {
            let Ok((email, result)) = joined else {
                // A panicking detection is counted, not propagated.
                outcome.fail_count += 1;
                continue;
            };

            match result {
                Ok(detection) => {
                    outcome.success_count += 1;
                    outcome.results.push(BatchDetectResult {
                        email,
                        protocol: Some(detection.protocol),
                        error: None,
                    });
                }
                Err(error) => {
                    tracing::error!(error = %error, email = %email, "batch detection entry failed");
                    outcome.fail_count += 1;
                    outcome.results.push(BatchDetectResult {
                        email,
                        protocol: None,
                        error: Some(error.to_string()),
                    });
                }
            }
        }

        tracing::info!(
            success = outcome.success_count,
            fail = outcome.fail_count,
            "batch protocol detection complete"
        );

        outcome
    }
}

fn validate(account: &MailAccount) -> Result<(), DetectError> {
    if account.email.is_empty() {
        return Err(DetectError::MissingField("email"));
    }
    if account.client_id.is_empty() {
        return Err(DetectError::MissingField("clientId"));
    }
    if account.refresh_token.is_empty() {
        return Err(DetectError::MissingField("refreshToken"));
    }
    if account.service_provider != ServiceProvider::Microsoft {
        return Err(DetectError::UnsupportedProvider(account.service_provider));
    }
    Ok(())
}

/// Whether a granted scope string carries Graph mail access.
fn is_graph_scope(scope: &str) -> bool {
    scope.contains(GRAPH_MAIL_SCOPE)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use token_cache_core::CacheError;
    use token_refresh::TokenBundle;

    use super::*;

    fn account(email: &str, refresh_token: &str) -> MailAccount {
        MailAccount {
            email: email.to_string(),
            client_id: "client".to_string(),
            refresh_token: refresh_token.to_string(),
            protocol: Protocol::Unknown,
            service_provider: ServiceProvider::Microsoft,
        }
    }

    /// Refresher granting a scripted scope per refresh credential.
    #[derive(Default)]
    struct ScopedStubRefresher {
        scopes: std::collections::HashMap<String, Option<String>>,
    }

    impl ScopedStubRefresher {
        fn with(mut self, refresh_token: &str, scope: Option<&str>) -> Self {
            self.scopes
                .insert(refresh_token.to_string(), scope.map(str::to_string));
            self
        }
    }

    #[async_trait::async_trait]
    impl TokenRefresher for ScopedStubRefresher {
        async fn refresh(
            &self,
            account: &MailAccount,
            variant: RefreshVariant,
        ) -> Result<TokenBundle, RefreshError> {
            assert_eq!(variant, RefreshVariant::Scoped);
            let scope = self
                .scopes
                .get(&account.refresh_token)
                .ok_or(RefreshError::EmptyAccessToken)?
                .clone();
            Ok(TokenBundle {
                access_token: format!("access-for-{}", account.refresh_token),
                refresh_token: None,
                scope,
                expires_in: Some(Duration::from_secs(3600)),
                token_type: "Bearer".to_string(),
            })
        }
    }

    /// Recording in-memory cache.
    #[derive(Default)]
    struct RecordingCache {
        entries: Mutex<std::collections::HashMap<String, String>>,
    }

    impl RecordingCache {
        fn stored(&self, refresh_token: &str) -> Option<String> {
            self.entries
                .lock()
                .expect("recording cache mutex poisoned")
                .get(refresh_token)
                .cloned()
        }
    }

    #[async_trait::async_trait]
    impl TokenCache for RecordingCache {
        async fn get_access_token(&self, _refresh_token: &str) -> Result<String, CacheError> {
            Err(CacheError::Miss)
        }

        async fn set_access_token(
            &self,
            refresh_token: &str,
            access_token: &str,
            _ttl: Duration,
        ) -> Result<(), CacheError> {
            self.entries
                .lock()
                .expect("recording cache mutex poisoned")
                .insert(refresh_token.to_string(), access_token.to_string());
            Ok(())
        }

        async fn close(&self) -> Result<(), CacheError> {
            Ok(())
        }
    }

    const GRAPH_SCOPE: &str =
        "https://graph.microsoft.com/Mail.ReadWrite https://graph.microsoft.com/User.Read";

    #[tokio::test]
    async fn graph_scope_detects_graph_and_caches_the_token() {
        let cache = Arc::new(RecordingCache::default());
        let refresher = Arc::new(ScopedStubRefresher::default().with("r1", Some(GRAPH_SCOPE)));
        let detector = ProtocolDetector::new(cache.clone(), refresher);

        let detection = detector
            .detect(&account("user@example.com", "r1"))
            .await
            .expect("detection should succeed");

        assert_eq!(detection.protocol, Protocol::Graph);
        assert_eq!(cache.stored("r1").as_deref(), Some("access-for-r1"));
    }

    #[tokio::test]
    async fn non_graph_scope_detects_imap_without_caching() {
        let cache = Arc::new(RecordingCache::default());
        let refresher = Arc::new(
            ScopedStubRefresher::default().with("r1", Some("openid offline_access Mail.Read")),
        );
        let detector = ProtocolDetector::new(cache.clone(), refresher);

        let detection = detector
            .detect(&account("user@example.com", "r1"))
            .await
            .expect("detection should succeed");

        assert_eq!(detection.protocol, Protocol::Imap);
        assert_eq!(cache.stored("r1"), None);
    }

    #[tokio::test]
    async fn missing_scope_detects_imap() {
        let cache = Arc::new(RecordingCache::default());
        let refresher = Arc::new(ScopedStubRefresher::default().with("r1", None));
        let detector = ProtocolDetector::new(cache, refresher);

        let detection = detector
            .detect(&account("user@example.com", "r1"))
            .await
            .expect("detection should succeed");

        assert_eq!(detection.protocol, Protocol::Imap);
    }

    #[tokio::test]
    async fn empty_fields_are_rejected() {
        let cache = Arc::new(RecordingCache::default());
        let refresher = Arc::new(ScopedStubRefresher::default());
        let detector = ProtocolDetector::new(cache, refresher);

        let missing_email = account("", "r1");
        let result = detector.detect(&missing_email).await;
        assert!(matches!(result, Err(DetectError::MissingField("email"))));

        let missing_refresh = account("user@example.com", "");
        let result = detector.detect(&missing_refresh).await;
        assert!(matches!(result, Err(DetectError::MissingField("refreshToken"))));
    }

    #[tokio::test]
    async fn non_microsoft_provider_is_rejected() {
        let cache = Arc::new(RecordingCache::default());
        let refresher = Arc::new(ScopedStubRefresher::default());
        let detector = ProtocolDetector::new(cache, refresher);

        let mut google = account("user@gmail.com", "r1");
        google.service_provider = ServiceProvider::Google;

        let result = detector.detect(&google).await;
        assert!(matches!(result, Err(DetectError::UnsupportedProvider(_))));
    }

    #[tokio::test]
    async fn batch_tallies_successes_and_failures() {
        let cache = Arc::new(RecordingCache::default());
        let refresher = Arc::new(
            ScopedStubRefresher::default()
                .with("r1", Some(GRAPH_SCOPE))
                .with("r2", Some(GRAPH_SCOPE)),
        );
        let detector = ProtocolDetector::new(cache.clone(), refresher);

        let outcome = detector
            .detect_batch(vec![
                account("one@example.com", "r1"),
                account("two@example.com", "r2"),
                account("bad@example.com", "r-unknown"),
            ])
            .await;

        assert_eq!(outcome.success_count, 2);
        assert_eq!(outcome.fail_count, 1);
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(cache.stored("r1").as_deref(), Some("access-for-r1"));
        assert_eq!(cache.stored("r2").as_deref(), Some("access-for-r2"));

        let failed = outcome
            .results
            .iter()
            .find(|result| result.email == "bad@example.com")
            .expect("the failing account should be reported");
        assert!(failed.protocol.is_none());
        assert!(failed.error.is_some());
    }

    #[tokio::test]
    async fn empty_batch_is_a_noop() {
        let cache = Arc::new(RecordingCache::default());
        let refresher = Arc::new(ScopedStubRefresher::default());
        let detector = ProtocolDetector::new(cache, refresher);

        let outcome = detector.detect_batch(Vec::new()).await;
        assert_eq!(outcome, BatchDetectOutcome::default());
    }
}
