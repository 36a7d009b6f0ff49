//! Order HTTP handlers.
//!
//! - POST /api/v1/orders - Checkout
//! - GET /api/v1/orders/{id} - Order details for its buyer or seller
//! - PATCH /api/v1/orders/{id}/status - Seller moves the order forward

use crate::{
    error::AppError,
    handlers::AppState,
    middleware::auth::AuthContext,
    models::order::{CheckoutReceipt, CreateOrderRequest, Order, UpdateOrderStatusRequest},
    services::order_service,
};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

/// Place an order as the authenticated buyer.
///
/// # Request Body
///
/// ```json
/// {
///   "seller_id": "550e8400-...",
///   "items": [
///     { "product_id": "660e8400-...", "quantity": 2 },
///     { "product_id": "770e8400-...", "quantity": 1, "product_referrer_id": "880e8400-..." }
///   ],
///   "payment_method": "wallet",
///   "referral_code": "ANNA42"
/// }
/// ```
///
/// # Response (201)
///
/// The order plus what happened to the partner commission:
///
/// ```json
/// {
///   "order": { "order_number": "ORD-20250101-4F2A9C", "total_amount": "3000.00", ... },
///   "commission": { "outcome": "paid", "referrer_id": "990e8400-...", "amount": "300.00" },
///   "product_referrals": 1
/// }
/// ```
pub async fn create_order(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CheckoutReceipt>), AppError> {
    let receipt = order_service::create_order(&state.store, auth.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn get_order(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = order_service::get_order(&state.store, order_id, auth.user_id).await?;
    Ok(Json(order))
}

/// Change an order's status. Only the seller may do this.
///
/// ```json
/// { "status": "completed" }
/// ```
pub async fn update_order_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<Order>, AppError> {
    let order =
        order_service::update_order_status(&state.store, order_id, request.status, auth.user_id)
            .await?;
    Ok(Json(order))
}
