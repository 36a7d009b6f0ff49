//! Referral top-up bonus engine.
//!
//! When a user funds their wallet and was invited by someone whose referral
//! window is still open, the inviter earns a percentage of the top-up on
//! their referral balance.

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    money::percent_of,
    referral::{ReferralEarning, TOPUP_BONUS_PERCENT},
    transaction::{LedgerEntry, Transaction, TransactionType},
    wallet::BalanceType,
};
use crate::services::wallet_service;
use crate::store::UnitOfWork;

/// Outcome of the bonus step of a top-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopupBonus {
    Awarded {
        referrer_id: Uuid,
        amount: Decimal,
    },
    /// No referrer, expired referral window, or a bonus that rounds to zero
    Skipped,
}

/// Referrer that a top-up by `user_id` would pay a bonus to right now.
pub async fn bonus_recipient<U: UnitOfWork>(
    uow: &mut U,
    user_id: Uuid,
) -> Result<Option<Uuid>, AppError> {
    let Some(user) = uow.get_user(user_id).await? else {
        return Ok(None);
    };
    Ok(user
        .active_referrer(Utc::now())
        .filter(|referrer| *referrer != user_id))
}

/// Pay the top-up bonus for `topup` to the referrer of `user_id`, if any.
///
/// Runs inside the top-up's unit of work. Writes the referrer's credit and
/// a `ReferralEarning` linking the top-up and bonus transactions.
pub async fn award_topup_bonus<U: UnitOfWork>(
    uow: &mut U,
    user_id: Uuid,
    topup: &Transaction,
) -> Result<TopupBonus, AppError> {
    let now = Utc::now();
    let Some(referrer_id) = bonus_recipient(uow, user_id).await? else {
        return Ok(TopupBonus::Skipped);
    };

    let bonus = percent_of(topup.amount, TOPUP_BONUS_PERCENT)?;
    if bonus <= Decimal::ZERO {
        return Ok(TopupBonus::Skipped);
    }

    let referrer_tx = wallet_service::credit(
        uow,
        referrer_id,
        bonus,
        BalanceType::Referral,
        LedgerEntry::new(
            TransactionType::Referral,
            format!("Referral bonus for a {} top-up", topup.amount),
        )
        .with_reference(topup.id),
    )
    .await?;

    let earning = ReferralEarning {
        id: Uuid::new_v4(),
        referrer_id,
        referee_id: user_id,
        transaction_id: topup.id,
        referrer_transaction_id: referrer_tx.id,
        topup_amount: topup.amount,
        earning_amount: bonus,
        created_at: now,
    };
    uow.insert_referral_earning(&earning).await?;

    tracing::info!(%referrer_id, referee_id = %user_id, %bonus, "referral top-up bonus awarded");
    Ok(TopupBonus::Awarded {
        referrer_id,
        amount: bonus,
    })
}
