//! Ledger transaction models and API request/response types.
//!
//! A `Transaction` is the append-only audit entry written alongside every
//! balance mutation. Its `amount` is signed: credits are positive, debits are
//! negative, so summing a user's entries per balance type reproduces the
//! balance.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::wallet::BalanceType;

/// What caused a balance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    #[serde(rename = "topup")]
    #[sqlx(rename = "topup")]
    TopUp,
    Withdrawal,
    Purchase,
    /// Buyer paying for an order from the wallet
    OrderPayment,
    /// Seller receiving the full order amount
    OrderReceived,
    /// Top-up bonus paid to the referrer
    Referral,
    /// Commission credited to a referrer for an order or product sale
    ReferralCommission,
    /// Commission charged to the seller under the partner program
    PartnerCommissionPayment,
    Promotion,
    TariffPurchase,
    Transfer,
    WithdrawalRefund,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

/// Represents a transaction record from the database.
///
/// # Database Table
///
/// Maps to the `transactions` table. Rows are never updated or deleted.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Transaction {
    pub id: Uuid,

    /// Owner of the balance that changed
    pub user_id: Uuid,

    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub transaction_type: TransactionType,

    /// Signed delta applied to the balance
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,

    pub balance_type: BalanceType,

    pub description: String,

    /// Order or withdrawal request that caused this entry
    pub reference_id: Option<Uuid>,

    pub status: TransactionStatus,

    /// Caller-supplied key that makes a retried top-up a no-op
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// What the caller of a wallet mutation knows about the entry to record.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub transaction_type: TransactionType,
    pub description: String,
    pub reference_id: Option<Uuid>,
    pub idempotency_key: Option<String>,
}

impl LedgerEntry {
    pub fn new(transaction_type: TransactionType, description: impl Into<String>) -> Self {
        Self {
            transaction_type,
            description: description.into(),
            reference_id: None,
            idempotency_key: None,
        }
    }

    pub fn with_reference(mut self, reference_id: Uuid) -> Self {
        self.reference_id = Some(reference_id);
        self
    }

    pub fn with_idempotency_key(mut self, key: Option<String>) -> Self {
        self.idempotency_key = key;
        self
    }

    /// Build the completed transaction row for a signed balance delta.
    pub fn into_transaction(
        self,
        user_id: Uuid,
        balance_type: BalanceType,
        amount: Decimal,
    ) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            user_id,
            transaction_type: self.transaction_type,
            amount,
            balance_type,
            description: self.description,
            reference_id: self.reference_id,
            status: TransactionStatus::Completed,
            idempotency_key: self.idempotency_key,
            created_at: Utc::now(),
        }
    }
}

/// Query parameters for `GET /api/v1/wallet/transactions`.
#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl Pagination {
    pub const DEFAULT_PER_PAGE: u32 = 20;
    pub const MAX_PER_PAGE: u32 = 100;

    /// `(limit, offset)` for a 1-based page.
    pub fn limit_offset(&self) -> (i64, i64) {
        let per_page = self
            .per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE) as i64;
        let page = self.page.unwrap_or(1).max(1) as i64;
        (per_page, (page - 1) * per_page)
    }
}

/// Response returned for transaction listings.
///
/// # JSON Example
///
/// ```json
/// {
///   "id": "770e8400-e29b-41d4-a716-446655440002",
///   "type": "order_payment",
///   "amount": "-3000.00",
///   "balance_type": "main",
///   "description": "Payment for order ORD-20250101-4F2A9C",
///   "reference_id": "660e8400-e29b-41d4-a716-446655440001",
///   "status": "completed",
///   "created_at": "2025-12-21T16:00:00Z"
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub balance_type: BalanceType,
    pub description: String,
    pub reference_id: Option<Uuid>,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

/// Drops the owner id, which is implied by the authenticated caller.
impl From<Transaction> for TransactionResponse {
    fn from(transaction: Transaction) -> Self {
        Self {
            id: transaction.id,
            transaction_type: transaction.transaction_type,
            amount: transaction.amount,
            balance_type: transaction.balance_type,
            description: transaction.description,
            reference_id: transaction.reference_id,
            status: transaction.status,
            created_at: transaction.created_at,
        }
    }
}
