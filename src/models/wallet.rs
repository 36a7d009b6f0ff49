//! Wallet data model and API response type.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Which of the two balances of a wallet an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BalanceType {
    /// Spendable funds (purchases, tariffs)
    Main,
    /// Commission earnings, withdrawable or transferable to main
    Referral,
}

impl std::fmt::Display for BalanceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BalanceType::Main => write!(f, "main"),
            BalanceType::Referral => write!(f, "referral"),
        }
    }
}

/// Represents a wallet record from the database.
///
/// # Database Table
///
/// Maps to the `wallets` table, one row per user, created lazily the first
/// time a ledger operation needs it.
///
/// # Balance Storage
///
/// Balances are `NUMERIC(20,2)` columns mapped to `Decimal`; both are
/// always `>= 0` (also enforced by CHECK constraints).
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct Wallet {
    pub user_id: Uuid,

    #[serde(with = "rust_decimal::serde::str")]
    pub main_balance: Decimal,

    #[serde(with = "rust_decimal::serde::str")]
    pub referral_balance: Decimal,

    /// Currency code (ISO 4217)
    pub currency: String,

    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// A fresh, empty wallet.
    pub fn empty(user_id: Uuid, currency: &str) -> Self {
        Self {
            user_id,
            main_balance: Decimal::new(0, 2),
            referral_balance: Decimal::new(0, 2),
            currency: currency.to_string(),
            updated_at: Utc::now(),
        }
    }

    pub fn balance(&self, balance_type: BalanceType) -> Decimal {
        match balance_type {
            BalanceType::Main => self.main_balance,
            BalanceType::Referral => self.referral_balance,
        }
    }

    /// Apply a signed delta to one balance.
    ///
    /// Fails with `LedgerInvariant` on overflow or if the balance would go
    /// negative; the wallet is left untouched in that case.
    pub fn apply_delta(&mut self, balance_type: BalanceType, delta: Decimal) -> Result<(), AppError> {
        let current = self.balance(balance_type);
        let next = current.checked_add(delta).ok_or_else(|| {
            AppError::LedgerInvariant(format!(
                "{} balance of {} overflowed",
                balance_type, self.user_id
            ))
        })?;

        if next.is_sign_negative() && !next.is_zero() {
            return Err(AppError::LedgerInvariant(format!(
                "{} balance of {} would become {}",
                balance_type, self.user_id, next
            )));
        }

        match balance_type {
            BalanceType::Main => self.main_balance = next,
            BalanceType::Referral => self.referral_balance = next,
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Response body for `GET /api/v1/wallet`.
///
/// # JSON Example
///
/// ```json
/// {
///   "main_balance": "2000.00",
///   "referral_balance": "300.00",
///   "currency": "USD"
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct WalletResponse {
    #[serde(with = "rust_decimal::serde::str")]
    pub main_balance: Decimal,

    #[serde(with = "rust_decimal::serde::str")]
    pub referral_balance: Decimal,

    pub currency: String,
}

impl From<Wallet> for WalletResponse {
    fn from(wallet: Wallet) -> Self {
        Self {
            main_balance: wallet.main_balance,
            referral_balance: wallet.referral_balance,
            currency: wallet.currency,
        }
    }
}

/// Request body for moving referral earnings into the main balance.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
}

/// Request body for crediting a confirmed top-up.
#[derive(Debug, Deserialize)]
pub struct TopupRequest {
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    /// Gateway payment id; retried confirmations with the same key credit once
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_delta_refuses_to_go_negative() {
        let mut wallet = Wallet::empty(Uuid::new_v4(), "USD");
        wallet
            .apply_delta(BalanceType::Main, Decimal::new(1000, 2))
            .unwrap();

        let err = wallet
            .apply_delta(BalanceType::Main, Decimal::new(-1001, 2))
            .unwrap_err();
        assert!(matches!(err, AppError::LedgerInvariant(_)));
        assert_eq!(wallet.main_balance, Decimal::new(1000, 2));

        wallet
            .apply_delta(BalanceType::Main, Decimal::new(-1000, 2))
            .unwrap();
        assert!(wallet.main_balance.is_zero());
        assert!(wallet.referral_balance.is_zero());
    }

    #[test]
    fn balances_serialize_as_strings() {
        let mut wallet = Wallet::empty(Uuid::nil(), "USD");
        wallet
            .apply_delta(BalanceType::Referral, Decimal::new(30000, 2))
            .unwrap();

        let json = serde_json::to_value(WalletResponse::from(wallet)).unwrap();
        assert_eq!(json["main_balance"], "0.00");
        assert_eq!(json["referral_balance"], "300.00");
    }
}
