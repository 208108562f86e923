//! Access token cache construction from configuration.

use config_core::{CacheConfig, CacheKind, RedisConfig};
use token_cache_core::TokenCache;

/// Errors returned while building a cache.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Redis connection failed.
    #[error("redis cache: {0}")]
    Redis(#[from] token_cache_redis::ConnectError),
}

/// Build the configured cache backend.
pub async fn build(config: &CacheConfig) -> Result<Box<dyn TokenCache>, BuildError> {
    match config.kind {
        CacheKind::Local => {
            tracing::info!(size = config.local.size, "using local token cache");
            Ok(Box::new(token_cache_local::LocalCache::new(config.local.size)))
        }
        CacheKind::Redis => {
            tracing::info!(
                redis_host = %config.redis.host,
                redis_port = config.redis.port,
                "using redis token cache"
            );
            Ok(Box::new(connect_redis(&config.redis).await?))
        }
        CacheKind::Multilevel => {
            tracing::info!(
                size = config.local.size,
                redis_host = %config.redis.host,
                redis_port = config.redis.port,
                "using multilevel token cache"
            );
            let l1 = token_cache_local::LocalCache::new(config.local.size);
            let l2 = connect_redis(&config.redis).await?;
            Ok(Box::new(token_cache_multilevel::MultiLevelCache::new(
                Box::new(l1),
                Box::new(l2),
            )))
        }
    }
}

async fn connect_redis(
    config: &RedisConfig,
) -> Result<token_cache_redis::RedisCache, token_cache_redis::ConnectError> {
    token_cache_redis::RedisCache::connect(token_cache_redis::RedisParams {
        host: config.host.clone(),
        port: config.port,
        password: config.password.clone(),
        db: config.db,
    })
    .await
}
