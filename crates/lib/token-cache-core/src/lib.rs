//! Access token cache interface and key derivation.

use std::time::Duration;

/// An error that can occur while reading or writing the cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The key is not present, or its entry has expired.
    #[error("cache miss")]
    Miss,

    /// The cache backend failed.
    #[error("cache backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl CacheError {
    /// Wrap a backend error.
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(error))
    }
}

/// Access token store keyed by the refresh credential.
///
/// Implementations apply [`cache_key`] internally, so the refresh credential
/// itself never reaches the backend namespace.
#[async_trait::async_trait]
pub trait TokenCache: Send + Sync {
    /// Look up the access token for a refresh credential.
    async fn get_access_token(&self, refresh_token: &str) -> Result<String, CacheError>;

    /// Store an access token for a refresh credential with a TTL.
    async fn set_access_token(
        &self,
        refresh_token: &str,
        access_token: &str,
        ttl: Duration,
    ) -> Result<(), CacheError>;

    /// Release the cache and its backend connections.
    async fn close(&self) -> Result<(), CacheError>;
}

#[async_trait::async_trait]
impl<T> TokenCache for std::sync::Arc<T>
where
    T: TokenCache + ?Sized,
{
    async fn get_access_token(&self, refresh_token: &str) -> Result<String, CacheError> {
        (**self).get_access_token(refresh_token).await
    }

    async fn set_access_token(
        &self,
        refresh_token: &str,
        access_token: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        (**self).set_access_token(refresh_token, access_token, ttl).await
    }

    async fn close(&self) -> Result<(), CacheError> {
        (**self).close().await
    }
}

/// Derive the cache key for a refresh credential.
///
/// The key is `access_token:` followed by the 16-hex-character xxhash64 of
/// the credential, so cache namespaces and logs never carry the secret.
pub fn cache_key(refresh_token: &str) -> String {
    let hash = twox_hash::XxHash64::oneshot(0, refresh_token.as_bytes());
    format!("access_token:{hash:016x}")
}
