//! Bounded in-process access token cache.

use std::time::{Duration, Instant};

use token_cache_core::{CacheError, TokenCache, cache_key};

/// Default capacity when none is configured.
const DEFAULT_CAPACITY: u64 = 1000;

/// A cached access token with its expiry deadline.
#[derive(Debug, Clone)]
struct CacheItem {
    /// The access token.
    value: String,

    /// Deadline after which the entry no longer counts as a hit.
    expires_at: Instant,
}

/// Bounded in-process cache.
///
/// The underlying store is internally synchronized and evicts the least
/// recently used entry under capacity pressure. TTLs are enforced lazily on
/// read: an expired entry is removed and reported as a miss.
pub struct LocalCache {
    cache: moka::future::Cache<String, CacheItem>,
}

impl LocalCache {
    /// Create a cache bounded to `capacity` entries; zero selects the default.
    pub fn new(capacity: u64) -> Self {
        let capacity = if capacity == 0 { DEFAULT_CAPACITY } else { capacity };
        Self {
            cache: moka::future::Cache::builder().max_capacity(capacity).build(),
        }
    }
}

#[async_trait::async_trait]
impl TokenCache for LocalCache {
    async fn get_access_token(&self, refresh_token: &str) -> Result<String, CacheError> {
        let key = cache_key(refresh_token);

        let Some(item) = self.cache.get(&key).await else {
            return Err(CacheError::Miss);
        };

        if Instant::now() > item.expires_at {
            self.cache.invalidate(&key).await;
            return Err(CacheError::Miss);
        }

        Ok(item.value)
    }

    async fn set_access_token(
        &self,
        refresh_token: &str,
        access_token: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let item = CacheItem {
            value: access_token.to_string(),
            expires_at: Instant::now() + ttl,
        };
        self.cache.insert(cache_key(refresh_token), item).await;
        Ok(())
    }

    async fn close(&self) -> Result<(), CacheError> {
        self.cache.invalidate_all();
        Ok(())
    }
}
