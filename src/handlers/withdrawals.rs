//! Withdrawal HTTP handlers.

use crate::{
    error::AppError,
    handlers::AppState,
    middleware::auth::AuthContext,
    models::withdrawal::{
        ApproveWithdrawalRequest, CreateWithdrawalRequest, RejectWithdrawalRequest,
        WithdrawalRequest,
    },
    services::withdrawal_service,
};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

/// `POST /api/v1/withdrawals`
///
/// The amount leaves the chosen balance immediately and stays escrowed
/// until an admin approves or rejects the request.
pub async fn request_withdrawal(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateWithdrawalRequest>,
) -> Result<(StatusCode, Json<WithdrawalRequest>), AppError> {
    let withdrawal = withdrawal_service::request_withdrawal(
        &state.store,
        auth.user_id,
        request,
        state.config.min_withdrawal,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(withdrawal)))
}

/// `GET /api/v1/withdrawals`
pub async fn list_withdrawals(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<WithdrawalRequest>>, AppError> {
    let withdrawals = withdrawal_service::list_withdrawals(&state.store, auth.user_id).await?;
    Ok(Json(withdrawals))
}

/// `POST /api/v1/admin/withdrawals/{id}/approve`
///
/// Body is optional: `{ "note": "paid via bank transfer" }`.
pub async fn approve_withdrawal(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(withdrawal_id): Path<Uuid>,
    request: Option<Json<ApproveWithdrawalRequest>>,
) -> Result<Json<WithdrawalRequest>, AppError> {
    auth.require_admin()?;

    let note = request.and_then(|Json(r)| r.note);
    let withdrawal = withdrawal_service::approve_withdrawal(&state.store, withdrawal_id, note).await?;
    Ok(Json(withdrawal))
}

/// `POST /api/v1/admin/withdrawals/{id}/reject`
///
/// ```json
/// { "reason": "invalid account" }
/// ```
pub async fn reject_withdrawal(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(withdrawal_id): Path<Uuid>,
    Json(request): Json<RejectWithdrawalRequest>,
) -> Result<Json<WithdrawalRequest>, AppError> {
    auth.require_admin()?;

    let withdrawal =
        withdrawal_service::reject_withdrawal(&state.store, withdrawal_id, &request.reason).await?;
    Ok(Json(withdrawal))
}
