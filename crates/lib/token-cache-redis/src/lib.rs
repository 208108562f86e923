//! Shared network access token cache backed by redis.

use std::time::Duration;

use redis::AsyncCommands as _;
use token_cache_core::{CacheError, TokenCache, cache_key};

/// Connection parameters for the redis backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RedisParams {
    /// Hostname or IP address of the redis server.
    pub host: String,

    /// Redis port.
    pub port: u16,

    /// Password; empty disables authentication.
    pub password: String,

    /// Logical database index.
    pub db: i64,
}

/// Errors returned while connecting to redis.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// Invalid connection parameters.
    #[error("invalid redis connection parameters: {0}")]
    InvalidParams(#[source] redis::RedisError),

    /// The initial connection or ping failed.
    #[error("redis connection failed: {0}")]
    Connect(#[source] redis::RedisError),
}

/// Access token cache over a shared redis instance.
///
/// TTLs are delegated to redis key expiry.
pub struct RedisCache {
    connection: redis::aio::ConnectionManager,
}

impl RedisCache {
    /// Connect to redis and verify the connection with a ping.
    pub async fn connect(params: RedisParams) -> Result<Self, ConnectError> {
        let info = redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(params.host, params.port),
            redis: redis::RedisConnectionInfo {
                db: params.db,
                username: None,
                password: if params.password.is_empty() {
                    None
                } else {
                    Some(params.password)
                },
                protocol: redis::ProtocolVersion::RESP3,
            },
        };

        let client = redis::Client::open(info).map_err(ConnectError::InvalidParams)?;
        let mut connection = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(ConnectError::Connect)?;

        redis::cmd("PING")
            .query_async::<()>(&mut connection)
            .await
            .map_err(ConnectError::Connect)?;

        Ok(Self { connection })
    }
}

#[async_trait::async_trait]
impl TokenCache for RedisCache {
    async fn get_access_token(&self, refresh_token: &str) -> Result<String, CacheError> {
        let key = cache_key(refresh_token);
        let mut connection = self.connection.clone();

        let value: Option<String> = connection.get(&key).await.map_err(CacheError::backend)?;
        value.ok_or(CacheError::Miss)
    }

    async fn set_access_token(
        &self,
        refresh_token: &str,
        access_token: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let key = cache_key(refresh_token);
        let mut connection = self.connection.clone();

        connection
            .set_ex::<_, _, ()>(&key, access_token, ttl.as_secs().max(1))
            .await
            .map_err(CacheError::backend)
    }

    async fn close(&self) -> Result<(), CacheError> {
        // The managed connection is released on drop.
        tracing::debug!("releasing redis cache connection");
        Ok(())
    }
}
