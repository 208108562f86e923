//! Protocol detection handlers.

use axum::extract::{Json, State};

use crate::rest::dto::{
    BatchDetectEntry, BatchDetectResponse, BatchMailInfoRequest, DetectProtocolResponse,
    MailInfoRequest,
};
use crate::rest::error::ApiError;
use crate::state::{AppState, MAX_BATCH_SIZE};

/// Detect the backend protocol of one account.
pub async fn detect_protocol(
    State(state): State<AppState>,
    Json(request): Json<MailInfoRequest>,
) -> Result<Json<DetectProtocolResponse>, ApiError> {
    let detection = state.detector.detect(&request.mail_info).await?;
    Ok(Json(DetectProtocolResponse {
        protocol: detection.protocol,
    }))
}

/// Detect protocols for up to [`MAX_BATCH_SIZE`] accounts concurrently.
pub async fn batch_detect_protocol(
    State(state): State<AppState>,
    Json(request): Json<BatchMailInfoRequest>,
) -> Result<Json<BatchDetectResponse>, ApiError> {
    if request.mail_infos.is_empty() {
        return Err(ApiError::BadRequest("mailInfos must not be empty".to_string()));
    }
    if request.mail_infos.len() > MAX_BATCH_SIZE {
        return Err(ApiError::BadRequest(format!(
            "at most {MAX_BATCH_SIZE} accounts per batch"
        )));
    }

    let outcome = state.detector.detect_batch(request.mail_infos).await;

    Ok(Json(BatchDetectResponse {
        success_count: outcome.success_count,
        fail_count: outcome.fail_count,
        results: outcome
            .results
            .into_iter()
            .map(|result| BatchDetectEntry {
                email: result.email,
                protocol: result.protocol,
                error: result.error,
            })
            .collect(),
    }))
}
