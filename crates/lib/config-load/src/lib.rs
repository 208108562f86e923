//! Configuration loading for the mail gateway.
//!
//! Settings come from a YAML file with per-key environment overrides
//! (`MAIL_GATEWAY_*`) applied on top.

use std::path::{Path, PathBuf};

use config_core::{CacheKind, Config, WebhookConfig};

/// Path suffix appended to the webhook base URL.
const WEBHOOK_PATH: &str = "/api/v1/graph/webhook";

/// Errors returned while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Failed to read the YAML file from disk.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the YAML contents.
    #[error("failed to parse YAML config {path}: {source}")]
    Parse {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying YAML parse error.
        source: serde_yaml_bw::Error,
    },

    /// An environment override is malformed.
    #[error("environment override: {0}")]
    Env(#[from] EnvError),
}

/// Errors returned while applying environment overrides.
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    /// A variable failed to parse.
    #[error("invalid value for {key}: {message}")]
    Var {
        /// The environment variable name.
        key: &'static str,
        /// What went wrong.
        message: String,
    },

    /// The cache type name is unknown.
    #[error("unknown cache type: {0}")]
    UnknownCacheKind(String),
}

/// Read an optional environment variable, normalizing the error.
fn maybe<T>(key: &'static str) -> Result<Option<T>, EnvError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    envfury::maybe(key).map_err(|error| EnvError::Var {
        key,
        message: error.to_string(),
    })
}

/// Load configuration: the YAML file if present, environment on top.
pub async fn load(path: Option<&Path>) -> Result<Config, LoadError> {
    let mut config = match path {
        Some(path) => load_from_path(path).await?,
        None => Config::default(),
    };
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Load configuration from a YAML file on disk.
pub async fn load_from_path<P>(path: P) -> Result<Config, LoadError>
where
    P: AsRef<Path>,
{
    let path_ref = path.as_ref();
    let contents = tokio::fs::read_to_string(path_ref)
        .await
        .map_err(|source| LoadError::Read {
            path: path_ref.to_path_buf(),
            source,
        })?;

    let config = serde_yaml_bw::from_str(&contents).map_err(|source| LoadError::Parse {
        path: path_ref.to_path_buf(),
        source,
    })?;

    Ok(config)
}

/// Parse configuration directly from a YAML string.
pub fn parse_yaml_str(contents: &str) -> Result<Config, serde_yaml_bw::Error> {
    serde_yaml_bw::from_str(contents)
}

/// Apply per-key `MAIL_GATEWAY_*` environment overrides.
pub fn apply_env_overrides(config: &mut Config) -> Result<(), EnvError> {
    if let Some(host) = maybe("MAIL_GATEWAY_SERVER_HOST")? {
        config.server.host = host;
    }
    if let Some(port) = maybe("MAIL_GATEWAY_SERVER_PORT")? {
        config.server.port = port;
    }
    if let Some(grpc_port) = maybe("MAIL_GATEWAY_GRPC_PORT")? {
        config.server.grpc_port = grpc_port;
    }
    if let Some(kind) = maybe::<String>("MAIL_GATEWAY_CACHE_TYPE")? {
        config.cache.kind = parse_cache_kind(&kind)?;
    }
    if let Some(size) = maybe("MAIL_GATEWAY_CACHE_LOCAL_SIZE")? {
        config.cache.local.size = size;
    }
    if let Some(host) = maybe("MAIL_GATEWAY_REDIS_HOST")? {
        config.cache.redis.host = host;
    }
    if let Some(port) = maybe("MAIL_GATEWAY_REDIS_PORT")? {
        config.cache.redis.port = port;
    }
    if let Some(password) = maybe("MAIL_GATEWAY_REDIS_PASSWORD")? {
        config.cache.redis.password = password;
    }
    if let Some(level) = maybe("MAIL_GATEWAY_LOG_LEVEL")? {
        config.log.level = level;
    }
    if let Some(base_url) = maybe("MAIL_GATEWAY_WEBHOOK_BASE_URL")? {
        config.webhook.base_url = base_url;
    }
    Ok(())
}

/// Derive the absolute webhook URL the upstream mail API pushes to.
pub fn webhook_notification_url(webhook: &WebhookConfig) -> String {
    let base = webhook.base_url.trim_end_matches('/');
    format!("{base}{WEBHOOK_PATH}")
}

fn parse_cache_kind(name: &str) -> Result<CacheKind, EnvError> {
    match name {
        "local" => Ok(CacheKind::Local),
        "redis" => Ok(CacheKind::Redis),
        "multilevel" | "multi-level" => Ok(CacheKind::Multilevel),
        other => Err(EnvError::UnknownCacheKind(other.to_string())),
    }
}
