//! gRPC service implementation.

use mail_domain::Protocol;
use subscribe_session::{
    EventSink, SessionError, SessionOutcome, SinkClosed, SubscribeEvent, run_graph_session,
    run_imap_session,
};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

use crate::grpc::convert;
use crate::grpc::proto;
use crate::grpc::proto::mail_service_server::MailService;
use crate::ops::{self, OpError};
use crate::state::{AppState, MAX_BATCH_SIZE};

/// The mail gateway gRPC service.
pub struct MailServiceGrpc {
    state: AppState,
}

impl MailServiceGrpc {
    /// Create the service over the shared state.
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

/// Sink forwarding session events into the response stream.
struct GrpcSink {
    tx: tokio::sync::mpsc::Sender<Result<proto::SubscribeMailEvent, Status>>,
}

#[async_trait::async_trait]
impl EventSink for GrpcSink {
    async fn emit(&mut self, event: SubscribeEvent) -> Result<(), SinkClosed> {
        self.tx
            .send(Ok(convert::event_to_proto(event)))
            .await
            .map_err(|_| SinkClosed)
    }

    async fn closed(&self) {
        self.tx.closed().await;
    }
}

fn op_status(error: OpError) -> Status {
    match error {
        OpError::InvalidInput(message) => Status::invalid_argument(message),
        OpError::Token(error) => Status::unauthenticated(error.to_string()),
        OpError::Imap(error) => Status::internal(error.to_string()),
        OpError::Graph(error) => Status::internal(error.to_string()),
    }
}

fn session_status(error: SessionError) -> Status {
    match error {
        SessionError::Token(error) => Status::unauthenticated(error.to_string()),
        SessionError::Imap(error) => Status::internal(error.to_string()),
        SessionError::CreateSubscription(error) => Status::internal(error.to_string()),
    }
}

fn detect_status(error: protocol_detect::DetectError) -> Status {
    match error {
        protocol_detect::DetectError::MissingField(_)
        | protocol_detect::DetectError::UnsupportedProvider(_) => {
            Status::invalid_argument(error.to_string())
        }
        protocol_detect::DetectError::Refresh(_) => Status::unauthenticated(error.to_string()),
    }
}

fn required_account(info: Option<proto::MailInfo>) -> Result<mail_domain::MailAccount, Status> {
    let info = info.ok_or_else(|| Status::invalid_argument("mailInfo must be set"))?;
    convert::account_from_proto(info)
}

#[tonic::async_trait]
impl MailService for MailServiceGrpc {
    type SubscribeMailStream = ReceiverStream<Result<proto::SubscribeMailEvent, Status>>;

    async fn subscribe_mail(
        &self,
        request: Request<proto::SubscribeMailRequest>,
    ) -> Result<Response<Self::SubscribeMailStream>, Status> {
        let request = request.into_inner();
        let account = required_account(request.mail_info)?;

        tracing::info!(
            email = %account.email,
            protocol = %account.protocol,
            refresh_needed = request.refresh_needed,
            "subscription stream request received"
        );

        if account.protocol == Protocol::Unknown {
            return Err(Status::invalid_argument(format!(
                "unsupported protocol: {}",
                account.protocol
            )));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let state = self.state.clone();
        let refresh_needed = request.refresh_needed;

        tokio::spawn(async move {
            let mut sink = GrpcSink { tx: tx.clone() };

            let result = match account.protocol {
                Protocol::Imap => {
                    run_imap_session(
                        &state.provider,
                        &account,
                        refresh_needed,
                        state.timers,
                        &mut sink,
                    )
                    .await
                }
                Protocol::Graph => {
                    run_graph_session(
                        &state.provider,
                        &account,
                        refresh_needed,
                        &state.graph,
                        &state.bus,
                        &state.notification_url,
                        state.timers,
                        &mut sink,
                    )
                    .await
                }
                Protocol::Unknown => return,
            };

            match result {
                Ok(SessionOutcome::TimedOut) => {
                    let _ = tx
                        .send(Err(Status::deadline_exceeded("subscription timed out")))
                        .await;
                }
                Ok(SessionOutcome::Delivered) | Ok(SessionOutcome::Disconnected) => {}
                Err(error) => {
                    tracing::error!(error = %error, email = %account.email, "subscription stream failed");
                    let _ = tx.send(Err(session_status(error))).await;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn get_latest_mail(
        &self,
        request: Request<proto::GetLatestMailRequest>,
    ) -> Result<Response<proto::GetLatestMailResponse>, Status> {
        let request = request.into_inner();
        let account = required_account(request.mail_info)?;

        let (email, new_refresh_token) =
            ops::latest_mail(&self.state, &account, request.refresh_needed)
                .await
                .map_err(op_status)?;

        Ok(Response::new(proto::GetLatestMailResponse {
            email: email.map(convert::email_to_proto),
            new_refresh_token,
        }))
    }

    async fn find_mail_by_id(
        &self,
        request: Request<proto::FindMailByIdRequest>,
    ) -> Result<Response<proto::FindMailByIdResponse>, Status> {
        let request = request.into_inner();
        let account = required_account(request.mail_info)?;

        let email = ops::find_mail_by_id(&self.state, &account, &request.email_id)
            .await
            .map_err(op_status)?;

        Ok(Response::new(proto::FindMailByIdResponse {
            email: email.map(convert::email_to_proto),
        }))
    }

    async fn get_latest_junk_mail(
        &self,
        request: Request<proto::GetLatestJunkMailRequest>,
    ) -> Result<Response<proto::GetLatestJunkMailResponse>, Status> {
        let request = request.into_inner();
        let account = required_account(request.mail_info)?;

        let email = ops::latest_junk_mail(&self.state, &account)
            .await
            .map_err(op_status)?;

        Ok(Response::new(proto::GetLatestJunkMailResponse {
            email: email.map(convert::email_to_proto),
        }))
    }

    async fn refresh_token(
        &self,
        request: Request<proto::RefreshTokenRequest>,
    ) -> Result<Response<proto::RefreshTokenResponse>, Status> {
        let request = request.into_inner();
        let account = required_account(request.mail_info)?;

        let new_refresh_token = ops::refresh_token(&self.state, &account)
            .await
            .map_err(op_status)?;

        Ok(Response::new(proto::RefreshTokenResponse {
            new_refresh_token,
        }))
    }

    async fn batch_refresh_token(
        &self,
        request: Request<proto::BatchRefreshTokenRequest>,
    ) -> Result<Response<proto::BatchRefreshTokenResponse>, Status> {
        let request = request.into_inner();

        if request.mail_infos.is_empty() {
            return Err(Status::invalid_argument("mailInfos must not be empty"));
        }
        if request.mail_infos.len() > MAX_BATCH_SIZE {
            return Err(Status::invalid_argument(format!(
                "at most {MAX_BATCH_SIZE} accounts per batch"
            )));
        }

        let accounts = request
            .mail_infos
            .into_iter()
            .map(convert::account_from_proto)
            .collect::<Result<Vec<_>, Status>>()?;

        let outcome = ops::batch_refresh_token(&self.state, accounts).await;

        Ok(Response::new(proto::BatchRefreshTokenResponse {
            success_count: outcome.success_count as i32,
            fail_count: outcome.fail_count as i32,
            results: outcome
                .results
                .into_iter()
                .map(|result| proto::RefreshTokenResult {
                    email: result.email,
                    new_refresh_token: result.new_refresh_token.unwrap_or_default(),
                    error: result.error.unwrap_or_default(),
                })
                .collect(),
        }))
    }

    async fn detect_protocol(
        &self,
        request: Request<proto::DetectProtocolRequest>,
    ) -> Result<Response<proto::DetectProtocolResponse>, Status> {
        let request = request.into_inner();
        let account = required_account(request.mail_info)?;

        let detection = self
            .state
            .detector
            .detect(&account)
            .await
            .map_err(detect_status)?;

        Ok(Response::new(proto::DetectProtocolResponse {
            protocol_type: convert::protocol_to_proto(Some(detection.protocol)) as i32,
        }))
    }

    async fn batch_detect_protocol(
        &self,
        request: Request<proto::BatchDetectProtocolRequest>,
    ) -> Result<Response<proto::BatchDetectProtocolResponse>, Status> {
        let request = request.into_inner();

        if request.mail_infos.is_empty() {
            return Err(Status::invalid_argument("mailInfos must not be empty"));
        }
        if request.mail_infos.len() > MAX_BATCH_SIZE {
            return Err(Status::invalid_argument(format!(
                "at most {MAX_BATCH_SIZE} accounts per batch"
            )));
        }

        let accounts = request
            .mail_infos
            .into_iter()
            .map(convert::account_from_proto)
            .collect::<Result<Vec<_>, Status>>()?;

        let outcome = self.state.detector.detect_batch(accounts).await;

        Ok(Response::new(proto::BatchDetectProtocolResponse {
            success_count: outcome.success_count as i32,
            fail_count: outcome.fail_count as i32,
            results: outcome
                .results
                .into_iter()
                .map(|result| proto::DetectProtocolResult {
                    email: result.email,
                    protocol_type: convert::protocol_to_proto(result.protocol) as i32,
                    error: result.error.unwrap_or_default(),
                })
                .collect(),
        }))
    }
}
