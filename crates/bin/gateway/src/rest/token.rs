//! Token rotation handlers.

use axum::extract::{Json, State};

use crate::ops;
use crate::rest::dto::{
    BatchMailInfoRequest, BatchRefreshEntry, BatchRefreshResponse, MailInfoRequest,
    RefreshTokenResponse,
};
use crate::rest::error::ApiError;
use crate::state::{AppState, MAX_BATCH_SIZE};

/// Rotate one refresh credential.
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(request): Json<MailInfoRequest>,
) -> Result<Json<RefreshTokenResponse>, ApiError> {
    tracing::info!(email = %request.mail_info.email, "token rotation request");

    let new_refresh_token = ops::refresh_token(&state, &request.mail_info).await?;
    Ok(Json(RefreshTokenResponse { new_refresh_token }))
}

/// Rotate up to [`MAX_BATCH_SIZE`] refresh credentials concurrently.
pub async fn batch_refresh_token(
    State(state): State<AppState>,
    Json(request): Json<BatchMailInfoRequest>,
) -> Result<Json<BatchRefreshResponse>, ApiError> {
    if request.mail_infos.is_empty() {
        return Err(ApiError::BadRequest("mailInfos must not be empty".to_string()));
    }
    if request.mail_infos.len() > MAX_BATCH_SIZE {
        return Err(ApiError::BadRequest(format!(
            "at most {MAX_BATCH_SIZE} accounts per batch"
        )));
    }

    tracing::info!(count = request.mail_infos.len(), "batch token rotation request");

    let outcome = ops::batch_refresh_token(&state, request.mail_infos).await;

    Ok(Json(BatchRefreshResponse {
        success_count: outcome.success_count,
        fail_count: outcome.fail_count,
        results: outcome
            .results
            .into_iter()
            .map(|result| BatchRefreshEntry {
                email: result.email,
                new_refresh_token: result.new_refresh_token,
                error: result.error,
            })
            .collect(),
    }))
}
