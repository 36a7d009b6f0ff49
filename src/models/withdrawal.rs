//! Withdrawal request models.
//!
//! Funds leave the wallet when the request is created (escrow). An admin
//! then either approves it (the payout happens outside the ledger) or
//! rejects it, which refunds the escrowed amount.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::wallet::BalanceType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Completed,
    Rejected,
}

impl std::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WithdrawalStatus::Pending => write!(f, "pending"),
            WithdrawalStatus::Completed => write!(f, "completed"),
            WithdrawalStatus::Rejected => write!(f, "rejected"),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub user_id: Uuid,

    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,

    pub balance_type: BalanceType,

    /// Payout channel, e.g. "card" or "bank_transfer"
    pub method: String,

    /// Card number, IBAN, wallet address... as entered by the user
    pub destination: String,

    pub status: WithdrawalStatus,

    pub admin_note: Option<String>,
    pub rejection_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl WithdrawalRequest {
    /// Only pending requests may be approved or rejected.
    pub fn ensure_pending(&self) -> Result<(), AppError> {
        if self.status != WithdrawalStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "withdrawal {} is already {}",
                self.id, self.status
            )));
        }
        Ok(())
    }
}

/// Request body for `POST /api/v1/withdrawals`.
///
/// # JSON Example
///
/// ```json
/// {
///   "amount": "1000.00",
///   "balance_type": "referral",
///   "method": "card",
///   "destination": "4111 1111 1111 1111"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWithdrawalRequest {
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,

    #[serde(default = "default_balance_type")]
    pub balance_type: BalanceType,

    pub method: String,
    pub destination: String,
}

fn default_balance_type() -> BalanceType {
    BalanceType::Referral
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveWithdrawalRequest {
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectWithdrawalRequest {
    pub reason: String,
}
