//! Wallet HTTP handlers.
//!
//! - GET /api/v1/wallet - Balances of the caller
//! - GET /api/v1/wallet/transactions - Caller's ledger history, newest first
//! - POST /api/v1/wallet/transfer - Move referral earnings to the main balance
//! - POST /api/v1/admin/wallets/{user_id}/topup - Credit a confirmed top-up

use crate::{
    error::AppError,
    handlers::AppState,
    middleware::auth::AuthContext,
    models::{
        transaction::{Pagination, TransactionResponse},
        wallet::{TopupRequest, TransferRequest, WalletResponse},
    },
    services::wallet_service,
};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use uuid::Uuid;

/// Get the caller's wallet.
///
/// # Response (200)
///
/// ```json
/// {
///   "main_balance": "2000.00",
///   "referral_balance": "300.00",
///   "currency": "USD"
/// }
/// ```
pub async fn get_wallet(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<WalletResponse>, AppError> {
    let wallet = wallet_service::get_wallet(&state.store, auth.user_id).await?;
    Ok(Json(wallet.into()))
}

/// List the caller's transactions.
///
/// `?page=2&per_page=50`; `per_page` defaults to 20 and is capped at 100.
pub async fn list_transactions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<TransactionResponse>>, AppError> {
    let (limit, offset) = pagination.limit_offset();
    let transactions =
        wallet_service::list_transactions(&state.store, auth.user_id, limit, offset).await?;

    Ok(Json(transactions.into_iter().map(Into::into).collect()))
}

/// Move referral earnings to the main balance.
///
/// # Request Body
///
/// ```json
/// { "amount": "150.00" }
/// ```
///
/// Returns the updated wallet.
pub async fn transfer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<WalletResponse>, AppError> {
    wallet_service::transfer_referral_to_main(&state.store, auth.user_id, request.amount).await?;
    let wallet = wallet_service::get_wallet(&state.store, auth.user_id).await?;
    Ok(Json(wallet.into()))
}

/// Credit a top-up confirmed by the payment gateway. Admin keys only.
pub async fn topup(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<TopupRequest>,
) -> Result<Json<TransactionResponse>, AppError> {
    auth.require_admin()?;

    let transaction = wallet_service::topup(
        &state.store,
        user_id,
        request.amount,
        request.idempotency_key,
    )
    .await?;
    Ok(Json(transaction.into()))
}
