//! Subscription tiers and their prices.

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Length of one paid subscription period.
pub const BILLING_PERIOD_DAYS: i64 = 30;

pub fn billing_period() -> Duration {
    Duration::days(BILLING_PERIOD_DAYS)
}

/// Subscription tier of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Tariff {
    Free,
    Pro,
    /// Unlocks the partner (order-level referral) program
    Business,
}

impl Tariff {
    pub fn is_paid(self) -> bool {
        !matches!(self, Tariff::Free)
    }

    /// Monthly price, `None` for the free tier.
    pub fn monthly_price(self, prices: &TariffPrices) -> Option<Decimal> {
        match self {
            Tariff::Free => None,
            Tariff::Pro => Some(prices.pro),
            Tariff::Business => Some(prices.business),
        }
    }
}

impl std::fmt::Display for Tariff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tariff::Free => write!(f, "free"),
            Tariff::Pro => write!(f, "pro"),
            Tariff::Business => write!(f, "business"),
        }
    }
}

/// Monthly prices of the paid tiers.
#[derive(Debug, Clone, Copy)]
pub struct TariffPrices {
    pub pro: Decimal,
    pub business: Decimal,
}

/// Request body for `POST /api/v1/tariffs`.
#[derive(Debug, Deserialize)]
pub struct PurchaseTariffRequest {
    pub tariff: Tariff,
}
