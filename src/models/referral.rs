//! Referral bookkeeping: top-up bonuses and product referral sales.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Percentage of every top-up paid to an active referrer.
pub const TOPUP_BONUS_PERCENT: Decimal = Decimal::from_parts(20, 0, 0, false, 0);

/// One top-up bonus paid to a referrer.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ReferralEarning {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub referee_id: Uuid,

    /// The referee's top-up transaction
    pub transaction_id: Uuid,

    /// The referrer's bonus transaction
    pub referrer_transaction_id: Uuid,

    #[serde(with = "rust_decimal::serde::str")]
    pub topup_amount: Decimal,

    #[serde(with = "rust_decimal::serde::str")]
    pub earning_amount: Decimal,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReferralPurchaseStatus {
    Pending,
    Completed,
}

/// A sale made through a product referral link. Paid out when the parent
/// order completes.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ProductReferralPurchase {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub buyer_id: Uuid,
    pub product_id: Uuid,
    pub order_id: Uuid,

    #[serde(with = "rust_decimal::serde::str")]
    pub commission_percent: Decimal,

    #[serde(with = "rust_decimal::serde::str")]
    pub commission_amount: Decimal,

    pub status: ReferralPurchaseStatus,

    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
