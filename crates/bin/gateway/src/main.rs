//! Mail gateway entrypoint: REST + SSE + webhook ingress and gRPC.

mod grpc;
mod ops;
mod rest;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use token_cache_core::TokenCache;
use token_refresh::TokenRefresher;

use crate::grpc::proto::mail_service_server::MailServiceServer;
use crate::state::AppState;

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;

    let config_path: Option<PathBuf> = envfury::maybe("MAIL_GATEWAY_CONFIG")?;
    let config = config_load::load(config_path.as_deref()).await?;

    init_tracing(&config.log.level)?;

    tracing::info!(
        rest_port = config.server.port,
        grpc_port = config.server.grpc_port,
        cache = ?config.cache.kind,
        "starting mail gateway"
    );

    let http_client = reqwest::Client::new();

    let cache: Arc<dyn TokenCache> = Arc::from(token_cache_factory::build(&config.cache).await?);
    let refresher: Arc<dyn TokenRefresher> =
        Arc::new(token_refresh::MicrosoftRefresher::new(http_client.clone())?);

    let state = AppState {
        provider: token_provider::TokenProvider::new(cache.clone(), refresher.clone()),
        detector: protocol_detect::ProtocolDetector::new(cache, refresher),
        graph: graph_client::GraphClient::new(http_client),
        bus: Arc::new(notification_bus::NotificationBus::new()),
        notification_url: config_load::webhook_notification_url(&config.webhook),
        timers: subscribe_session::SessionTimers::default(),
    };

    if state.notification_url.starts_with('/') {
        tracing::warn!(
            "webhook base URL is not configured; Graph subscriptions will not receive pushes"
        );
    }

    let mut join_set = tokio::task::JoinSet::new();

    let rest_addr = format!("{}:{}", config.server.host, config.server.port);
    let rest_router = rest::router(state.clone());
    join_set.spawn(async move {
        let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
        tracing::info!(addr = %rest_addr, "REST server listening");
        axum::serve(listener, rest_router).await?;
        Ok::<(), color_eyre::eyre::Report>(())
    });

    let grpc_addr = tokio::net::lookup_host(format!(
        "{}:{}",
        config.server.host, config.server.grpc_port
    ))
    .await?
    .next()
    .ok_or_else(|| color_eyre::eyre::eyre!("cannot resolve the gRPC bind address"))?;
    let grpc_service = MailServiceServer::new(grpc::MailServiceGrpc::new(state));
    join_set.spawn(async move {
        tracing::info!(addr = %grpc_addr, "gRPC server listening");
        tonic::transport::Server::builder()
            .add_service(grpc_service)
            .serve(grpc_addr)
            .await?;
        Ok::<(), color_eyre::eyre::Report>(())
    });

    while let Some(result) = join_set.join_next().await {
        result??;
    }

    Ok(())
}

fn init_tracing(level: &str) -> color_eyre::eyre::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_new(level)?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}
