//! Shared configuration types for the mail gateway.

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// Listener settings.
    pub server: ServerConfig,

    /// Access token cache settings.
    pub cache: CacheConfig,

    /// Logging settings.
    pub log: LogConfig,

    /// Webhook ingress settings.
    pub webhook: WebhookConfig,
}

/// Listener settings for the REST and gRPC servers.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,

    /// REST port.
    pub port: u16,

    /// gRPC port.
    pub grpc_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            grpc_port: 50051,
        }
    }
}

/// Selected cache backend.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheKind {
    /// Bounded in-process cache.
    #[default]
    Local,

    /// Shared redis cache.
    Redis,

    /// Local L1 over a shared redis L2.
    #[serde(alias = "multi-level")]
    Multilevel,
}

/// Access token cache settings.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CacheConfig {
    /// Which backend to use.
    #[serde(rename = "type")]
    pub kind: CacheKind,

    /// In-process cache settings.
    pub local: LocalCacheConfig,

    /// Redis settings.
    pub redis: RedisConfig,
}

/// In-process cache settings.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LocalCacheConfig {
    /// Entry capacity.
    pub size: u64,
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self { size: 1000 }
    }
}

/// Redis settings.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RedisConfig {
    /// Hostname or IP address.
    pub host: String,

    /// Port.
    pub port: u16,

    /// Password; empty disables authentication.
    pub password: String,

    /// Logical database index.
    pub db: i64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: String::new(),
            db: 0,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LogConfig {
    /// Log level filter (`trace`..`error`).
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Webhook ingress settings.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct WebhookConfig {
    /// Publicly reachable base URL the upstream mail API can push to.
    pub base_url: String,
}
