//! Error types and HTTP error response handling.
//!
//! Every ledger operation returns `Result<T, AppError>`. The variants mirror
//! the failures callers are expected to handle; storage failures and broken
//! ledger invariants are collapsed into a generic 500 at the HTTP boundary.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Ledger Errors**: insufficient funds, withdrawals below the minimum
/// - **Resource Errors**: unknown orders, withdrawals, sellers or products
/// - **State Errors**: illegal order transitions, already processed withdrawals
/// - **Access Errors**: missing API key, actor not allowed to act on a resource
/// - **Internal Errors**: database failures and broken ledger invariants
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (connection error, query error, etc).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// API key is missing, invalid, or inactive.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// The targeted balance is lower than the requested debit.
    ///
    /// Returns HTTP 422 Unprocessable Entity.
    #[error("Insufficient funds")]
    InsufficientFunds,

    /// A purchased product does not exist, is not active, or belongs to a
    /// different seller than the one named in the checkout.
    #[error("Product {0} is unavailable")]
    ProductUnavailable(Uuid),

    #[error("Seller not found")]
    SellerNotFound,

    /// The actor is not allowed to perform this operation.
    ///
    /// Returns HTTP 403 Forbidden.
    #[error("Forbidden")]
    Forbidden,

    /// Order status change that the order state machine does not allow.
    #[error("Cannot change order status from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Operation on a record that is no longer in a state that accepts it
    /// (e.g. approving an already rejected withdrawal).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Withdrawal amount is lower than the configured threshold.
    #[error("Amount is below the minimum of {minimum}")]
    BelowMinimum { minimum: Decimal },

    /// Requested resource does not exist.
    ///
    /// The payload names the kind of resource ("order", "withdrawal", ...).
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Request body or parameters are invalid.
    #[error("Invalid request")]
    InvalidRequest(String),

    /// A balance mutation would overflow or go negative.
    ///
    /// Public operations check balances before mutating, so reaching this
    /// means a caller skipped a check.
    #[error("Ledger invariant violated: {0}")]
    LedgerInvariant(String),
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "insufficient_funds",
///     "message": "Insufficient funds"
///   }
/// }
/// ```
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                self.to_string(),
            ),
            AppError::InsufficientFunds => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "insufficient_funds",
                self.to_string(),
            ),
            AppError::ProductUnavailable(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "product_unavailable",
                self.to_string(),
            ),
            AppError::SellerNotFound => {
                (StatusCode::NOT_FOUND, "seller_not_found", self.to_string())
            }
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", self.to_string()),
            AppError::InvalidTransition { .. } => (
                StatusCode::CONFLICT,
                "invalid_transition",
                self.to_string(),
            ),
            AppError::InvalidState(_) => {
                (StatusCode::CONFLICT, "invalid_state", self.to_string())
            }
            AppError::BelowMinimum { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "below_minimum",
                self.to_string(),
            ),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::Database(ref e) => {
                tracing::error!("database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::LedgerInvariant(ref msg) => {
                tracing::error!("ledger invariant violated: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
