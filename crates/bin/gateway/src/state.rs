//! Shared service state.

use std::sync::Arc;

use graph_client::GraphClient;
use notification_bus::NotificationBus;
use protocol_detect::ProtocolDetector;
use subscribe_session::SessionTimers;
use token_provider::TokenProvider;

/// Per-request batch size cap for the batch endpoints.
pub const MAX_BATCH_SIZE: usize = 100;

/// Everything the REST and gRPC surfaces share.
#[derive(Clone)]
pub struct AppState {
    /// Token acquisition.
    pub provider: TokenProvider,

    /// Protocol detection.
    pub detector: ProtocolDetector,

    /// Graph mail API client.
    pub graph: GraphClient,

    /// Webhook notification fan-out.
    pub bus: Arc<NotificationBus>,

    /// Absolute URL the upstream mail API pushes notifications to.
    pub notification_url: String,

    /// Subscription session timers.
    pub timers: SessionTimers,
}
