//! Two-level access token cache.

use std::time::Duration;

use token_cache_core::{CacheError, TokenCache};

/// Upper bound on the L1 TTL.
///
/// L1 must not outlive the presumed access token lifetime, regardless of the
/// TTL requested for L2.
const L1_TTL_CAP: Duration = Duration::from_secs(50 * 60);

/// A combined close failure naming the layers that failed.
#[derive(Debug, thiserror::Error)]
#[error("failed to close caches - L1: {l1:?}, L2: {l2:?}")]
pub struct CloseBothError {
    /// L1 close error, if any.
    pub l1: Option<CacheError>,

    /// L2 close error, if any.
    pub l2: Option<CacheError>,
}

/// Two-level cache: a fast local L1 in front of a shared L2.
pub struct MultiLevelCache {
    l1: Box<dyn TokenCache>,
    l2: Box<dyn TokenCache>,
}

impl MultiLevelCache {
    /// Combine a local L1 with a shared L2.
    pub fn new(l1: Box<dyn TokenCache>, l2: Box<dyn TokenCache>) -> Self {
        Self { l1, l2 }
    }
}

#[async_trait::async_trait]
impl TokenCache for MultiLevelCache {
    /// Read path: L1, then L2. An L2 hit is backfilled into L1 with a capped
    /// TTL so L1 cannot outlive the shared entry.
    async fn get_access_token(&self, refresh_token: &str) -> Result<String, CacheError> {
        if let Ok(token) = self.l1.get_access_token(refresh_token).await {
            return Ok(token);
        }

        let token = self.l2.get_access_token(refresh_token).await?;

        if let Err(error) = self
            .l1
            .set_access_token(refresh_token, &token, L1_TTL_CAP)
            .await
        {
            tracing::error!(error = %error, "failed to backfill L1 cache");
        }

        Ok(token)
    }

    /// Write path: both layers. A single-layer failure is logged and the
    /// write still counts as a success; only a double failure is surfaced.
    async fn set_access_token(
        &self,
        refresh_token: &str,
        access_token: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let l1_result = self
            .l1
            .set_access_token(refresh_token, access_token, ttl.min(L1_TTL_CAP))
            .await;
        let l2_result = self.l2.set_access_token(refresh_token, access_token, ttl).await;

        match (l1_result, l2_result) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(l1_error), Err(l2_error)) => Err(CacheError::Backend(
                format!("failed to write to both caches - L1: {l1_error}, L2: {l2_error}").into(),
            )),
            (Err(l1_error), Ok(())) => {
                tracing::error!(error = %l1_error, "failed to write to L1 cache");
                Ok(())
            }
            (Ok(()), Err(l2_error)) => {
                tracing::error!(error = %l2_error, "failed to write to L2 cache");
                Ok(())
            }
        }
    }

    async fn close(&self) -> Result<(), CacheError> {
        let l1_result = self.l1.close().await;
        let l2_result = self.l2.close().await;

        match (l1_result, l2_result) {
            (Ok(()), Ok(())) => Ok(()),
            (l1, l2) => Err(CacheError::backend(CloseBothError {
                l1: l1.err(),
                l2: l2.err(),
            })),
        }
    }
}
