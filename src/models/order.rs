//! Order data models and API request/response types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::money::{MAX_AMOUNT, ensure_within_limit};

/// Order lifecycle.
///
/// ```text
/// pending ──► processing ──► completed
///    │  └──────────────────►
///    └────────┴────────────► cancelled
/// ```
///
/// `completed` and `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

/// Result of checking a requested status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    /// Status actually changes
    Apply,
    /// Order already has the requested terminal status
    AlreadyApplied,
}

impl OrderStatus {
    /// Validate `self -> next` against the order state machine.
    ///
    /// Re-requesting `completed` on a completed order is accepted so the
    /// seller can retry a completion without an error.
    pub fn transition(self, next: OrderStatus) -> Result<StatusChange, AppError> {
        use OrderStatus::*;
        match (self, next) {
            (Completed, Completed) => Ok(StatusChange::AlreadyApplied),
            (Pending, Processing)
            | (Pending, Completed)
            | (Processing, Completed)
            | (Pending, Cancelled)
            | (Processing, Cancelled) => Ok(StatusChange::Apply),
            (from, to) => Err(AppError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "pending"),
            OrderStatus::Processing => write!(f, "processing"),
            OrderStatus::Completed => write!(f, "completed"),
            OrderStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// How the buyer pays. Only `wallet` moves money inside the ledger; the
/// other methods are settled by an external gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Wallet,
    Card,
    Cash,
}

impl PaymentMethod {
    pub fn initial_status(self) -> OrderStatus {
        match self {
            PaymentMethod::Wallet => OrderStatus::Processing,
            PaymentMethod::Card | PaymentMethod::Cash => OrderStatus::Pending,
        }
    }
}

/// One line of an order.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct OrderItem {
    pub product_id: Uuid,
    pub quantity: i32,

    #[serde(with = "rust_decimal::serde::str")]
    pub unit_price: Decimal,

    #[serde(with = "rust_decimal::serde::str_option")]
    pub discount_price: Option<Decimal>,

    /// User whose product referral link led to this purchase
    pub product_referrer_id: Option<Uuid>,
}

impl OrderItem {
    /// `quantity × (discount_price or unit_price)`.
    ///
    /// Fails with `InvalidRequest` when the line exceeds [`MAX_AMOUNT`].
    pub fn line_total(&self) -> Result<Decimal, AppError> {
        let total = self
            .discount_price
            .unwrap_or(self.unit_price)
            .checked_mul(Decimal::from(self.quantity))
            .ok_or_else(|| {
                AppError::InvalidRequest(format!("Amount must not exceed {MAX_AMOUNT}"))
            })?;
        ensure_within_limit(total)
    }
}

/// Represents an order record from the database.
///
/// # Database Table
///
/// Maps to `orders`; `items` live in `order_items` and are loaded separately.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Order {
    pub id: Uuid,

    /// Human-readable unique number, e.g. `ORD-20251221-4F2A9C`
    pub order_number: String,

    pub buyer_id: Uuid,
    pub seller_id: Uuid,

    #[sqlx(skip)]
    pub items: Vec<OrderItem>,

    #[serde(with = "rust_decimal::serde::str")]
    pub total_amount: Decimal,

    pub payment_method: PaymentMethod,
    pub status: OrderStatus,

    /// Referrer of the order-level partner program
    pub referral_id: Option<Uuid>,

    #[serde(with = "rust_decimal::serde::str_option")]
    pub referral_commission: Option<Decimal>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Generate a human-readable order number.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::random_range(0..0x0100_0000);
    format!("ORD-{}-{:06X}", now.format("%Y%m%d"), suffix)
}

/// Line of `POST /api/v1/orders`.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    #[serde(default)]
    pub product_referrer_id: Option<Uuid>,
}

/// Request body for `POST /api/v1/orders`.
///
/// # JSON Example
///
/// ```json
/// {
///   "seller_id": "550e8400-e29b-41d4-a716-446655440000",
///   "items": [{ "product_id": "...", "quantity": 2 }],
///   "payment_method": "wallet",
///   "referral_code": "ANNA42"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub seller_id: Uuid,
    pub items: Vec<OrderItemRequest>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub referral_code: Option<String>,
}

/// Request body for `PATCH /api/v1/orders/{id}/status`.
#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

/// What happened to the order-level partner commission at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommissionOutcome {
    /// No usable referral code, no partner percentage, or the seller's
    /// Business tier is not active
    NotApplicable,
    Paid {
        referrer_id: Uuid,
        #[serde(with = "rust_decimal::serde::str")]
        amount: Decimal,
    },
    /// Seller balance could not cover the commission; the order stands
    SkippedInsufficientFunds {
        referrer_id: Uuid,
        #[serde(with = "rust_decimal::serde::str")]
        amount: Decimal,
    },
}

/// Result of a checkout.
#[derive(Debug, Serialize)]
pub struct CheckoutReceipt {
    pub order: Order,
    pub commission: CommissionOutcome,
    /// Product referral purchases recorded as pending
    pub product_referrals: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_is_one_way() {
        use OrderStatus::*;
        assert_eq!(Pending.transition(Processing).unwrap(), StatusChange::Apply);
        assert_eq!(Processing.transition(Completed).unwrap(), StatusChange::Apply);
        assert_eq!(
            Completed.transition(Completed).unwrap(),
            StatusChange::AlreadyApplied
        );

        for next in [Pending, Processing, Cancelled] {
            assert!(matches!(
                Completed.transition(next),
                Err(AppError::InvalidTransition { .. })
            ));
        }
        for next in [Pending, Processing, Completed, Cancelled] {
            assert!(Cancelled.transition(next).is_err());
        }
        assert!(Processing.transition(Pending).is_err());
    }

    #[test]
    fn line_total_prefers_discount_price() {
        let item = OrderItem {
            product_id: Uuid::new_v4(),
            quantity: 3,
            unit_price: Decimal::new(1000, 2),
            discount_price: Some(Decimal::new(750, 2)),
            product_referrer_id: None,
        };
        assert_eq!(item.line_total().unwrap(), Decimal::new(2250, 2));

        let huge = OrderItem {
            quantity: i32::MAX,
            discount_price: Some(MAX_AMOUNT),
            ..item
        };
        assert!(matches!(huge.line_total(), Err(AppError::InvalidRequest(_))));
    }

    #[test]
    fn order_numbers_are_dated() {
        let now = DateTime::parse_from_rfc3339("2025-12-21T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let number = generate_order_number(now);
        assert!(number.starts_with("ORD-20251221-"));
        assert_eq!(number.len(), "ORD-20251221-".len() + 6);
    }

    #[test]
    fn commission_outcome_is_tagged() {
        let json = serde_json::to_value(CommissionOutcome::SkippedInsufficientFunds {
            referrer_id: Uuid::nil(),
            amount: Decimal::new(30000, 2),
        })
        .unwrap();
        assert_eq!(json["outcome"], "skipped_insufficient_funds");
        assert_eq!(json["amount"], "300.00");
    }
}
