//! Fixed-point money helpers.
//!
//! All amounts in the ledger are `rust_decimal::Decimal` values with two
//! fractional digits. Floating point never touches a balance.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::AppError;

/// Number of fractional digits kept for every amount.
pub const MONEY_SCALE: u32 = 2;

/// Largest amount or balance the ledger stores: `999999999999999999.99`,
/// the top of a `NUMERIC(20,2)` column.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_661_992_959, 1_808_227_885, 5, false, 2);

fn too_large() -> AppError {
    AppError::InvalidRequest(format!("Amount must not exceed {MAX_AMOUNT}"))
}

/// Round an amount to the ledger scale (half away from zero).
///
/// The result always carries exactly two fractional digits so it renders as
/// `"5.00"` rather than `"5"`.
pub fn round_money(amount: Decimal) -> Decimal {
    let mut rounded =
        amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// `amount * percent / 100`, rounded to the ledger scale.
///
/// Fails with `InvalidRequest` if the result is beyond [`MAX_AMOUNT`].
pub fn percent_of(amount: Decimal, percent: Decimal) -> Result<Decimal, AppError> {
    let share = amount
        .checked_mul(percent)
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .ok_or_else(too_large)?;
    ensure_within_limit(round_money(share))
}

/// `a + b`, failing with `InvalidRequest` past [`MAX_AMOUNT`].
pub fn checked_total(a: Decimal, b: Decimal) -> Result<Decimal, AppError> {
    a.checked_add(b)
        .ok_or_else(too_large)
        .and_then(ensure_within_limit)
}

/// Reject amounts the ledger cannot store.
pub fn ensure_within_limit(amount: Decimal) -> Result<Decimal, AppError> {
    if amount > MAX_AMOUNT {
        return Err(too_large());
    }
    Ok(amount)
}

/// Reject zero, negative, sub-cent and oversized amounts coming from callers.
pub fn validate_amount(amount: Decimal) -> Result<Decimal, AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::InvalidRequest(
            "Amount must be positive".to_string(),
        ));
    }
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(AppError::InvalidRequest(format!(
            "Amount must have at most {} fractional digits",
            MONEY_SCALE
        )));
    }
    ensure_within_limit(amount)?;
    Ok(round_money(amount))
}
