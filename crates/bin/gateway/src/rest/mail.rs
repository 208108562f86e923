//! Unary mail handlers.

use axum::extract::{Json, State};

use crate::ops;
use crate::rest::dto::{
    FindMailRequest, FindMailResponse, GetLatestMailRequest, GetLatestMailResponse,
    MailInfoRequest,
};
use crate::rest::error::ApiError;
use crate::state::AppState;

/// Fetch the newest inbox message.
pub async fn latest_mail(
    State(state): State<AppState>,
    Json(request): Json<GetLatestMailRequest>,
) -> Result<Json<GetLatestMailResponse>, ApiError> {
    let (email, new_refresh_token) =
        ops::latest_mail(&state, &request.mail_info, request.refresh_needed).await?;

    Ok(Json(GetLatestMailResponse {
        email,
        new_refresh_token,
    }))
}

/// Fetch a message by its identifier.
pub async fn find_mail(
    State(state): State<AppState>,
    Json(request): Json<FindMailRequest>,
) -> Result<Json<FindMailResponse>, ApiError> {
    let email = ops::find_mail_by_id(&state, &request.mail_info, &request.email_id).await?;
    Ok(Json(FindMailResponse { email }))
}

/// Fetch the newest junk message.
pub async fn latest_junk_mail(
    State(state): State<AppState>,
    Json(request): Json<MailInfoRequest>,
) -> Result<Json<FindMailResponse>, ApiError> {
    let email = ops::latest_junk_mail(&state, &request.mail_info).await?;
    Ok(Json(FindMailResponse { email }))
}
