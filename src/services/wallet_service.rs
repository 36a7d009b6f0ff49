//! Wallet service - atomic balance mutations.
//!
//! Every successful `debit` or `credit` writes the new balance and exactly
//! one `Transaction` row inside the caller's unit of work, so the two are
//! committed or discarded together.
//!
//! # Locking
//!
//! `debit`/`credit` lock the wallet they touch. Operations that touch
//! several wallets call [`lock_wallets`] first so locks are always taken in
//! ascending user id order.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    money::{checked_total, validate_amount},
    transaction::{LedgerEntry, Transaction, TransactionType},
    wallet::{BalanceType, Wallet},
};
use crate::services::referral_service;
use crate::store::{LedgerStore, UnitOfWork};

/// Lock (creating if needed) the wallets of `user_ids` in a deadlock-free order.
pub async fn lock_wallets<U: UnitOfWork>(uow: &mut U, user_ids: &[Uuid]) -> Result<(), AppError> {
    let mut ids = user_ids.to_vec();
    ids.sort();
    ids.dedup();
    for id in ids {
        uow.wallet_for_update(id).await?;
    }
    Ok(())
}

/// Return the user's wallet, creating an empty one if it does not exist.
pub async fn get_or_create<U: UnitOfWork>(uow: &mut U, user_id: Uuid) -> Result<Wallet, AppError> {
    uow.wallet_for_update(user_id).await
}

/// Remove `amount` from one balance of a wallet.
///
/// # Errors
///
/// - `InvalidRequest`: amount is zero, negative or has sub-cent digits
/// - `InsufficientFunds`: the balance is lower than `amount`; nothing is written
pub async fn debit<U: UnitOfWork>(
    uow: &mut U,
    user_id: Uuid,
    amount: Decimal,
    balance_type: BalanceType,
    entry: LedgerEntry,
) -> Result<Transaction, AppError> {
    let amount = validate_amount(amount)?;
    let mut wallet = uow.wallet_for_update(user_id).await?;

    if wallet.balance(balance_type) < amount {
        return Err(AppError::InsufficientFunds);
    }

    wallet.apply_delta(balance_type, -amount)?;
    uow.save_wallet(&wallet).await?;

    let transaction = entry.into_transaction(user_id, balance_type, -amount);
    uow.insert_transaction(&transaction).await?;

    tracing::debug!(%user_id, %amount, %balance_type, "wallet debited");
    Ok(transaction)
}

/// Add `amount` to one balance of a wallet.
///
/// Fails with `InvalidRequest` if the balance would pass `MAX_AMOUNT`.
pub async fn credit<U: UnitOfWork>(
    uow: &mut U,
    user_id: Uuid,
    amount: Decimal,
    balance_type: BalanceType,
    entry: LedgerEntry,
) -> Result<Transaction, AppError> {
    let amount = validate_amount(amount)?;
    let mut wallet = uow.wallet_for_update(user_id).await?;
    checked_total(wallet.balance(balance_type), amount)?;

    wallet.apply_delta(balance_type, amount)?;
    uow.save_wallet(&wallet).await?;

    let transaction = entry.into_transaction(user_id, balance_type, amount);
    uow.insert_transaction(&transaction).await?;

    tracing::debug!(%user_id, %amount, %balance_type, "wallet credited");
    Ok(transaction)
}

/// Current balances of a user. Users who never touched the ledger get an
/// empty wallet, which is created on the spot.
pub async fn get_wallet<S: LedgerStore>(store: &S, user_id: Uuid) -> Result<Wallet, AppError> {
    if let Some(wallet) = store.find_wallet(user_id).await? {
        return Ok(wallet);
    }

    let mut uow = store.begin().await?;
    let wallet = get_or_create(&mut uow, user_id).await?;
    uow.commit().await?;
    Ok(wallet)
}

/// Credit a confirmed top-up to the main balance.
///
/// The referral top-up bonus runs inside the same unit of work. It never
/// fails the top-up: if there is no qualifying referrer it is skipped.
///
/// A repeated `idempotency_key` for the same user and amount returns the
/// original transaction without crediting again; reusing it for anything
/// else fails with `InvalidState`.
pub async fn topup<S: LedgerStore>(
    store: &S,
    user_id: Uuid,
    amount: Decimal,
    idempotency_key: Option<String>,
) -> Result<Transaction, AppError> {
    let amount = validate_amount(amount)?;
    let idempotency_key = normalize_idempotency_key(idempotency_key)?;
    let mut uow = store.begin().await?;

    let mut wallets = vec![user_id];
    wallets.extend(referral_service::bonus_recipient(&mut uow, user_id).await?);
    lock_wallets(&mut uow, &wallets).await?;

    if let Some(key) = &idempotency_key {
        if let Some(existing) = uow.find_transaction_by_idempotency_key(key).await? {
            if existing.user_id != user_id
                || existing.transaction_type != TransactionType::TopUp
                || existing.amount != amount
            {
                return Err(AppError::InvalidState(format!(
                    "idempotency key {key} was used for a different operation"
                )));
            }
            tracing::info!(%user_id, key, "duplicate top-up ignored");
            return Ok(existing);
        }
    }

    let transaction = credit(
        &mut uow,
        user_id,
        amount,
        BalanceType::Main,
        LedgerEntry::new(TransactionType::TopUp, "Wallet top-up")
            .with_idempotency_key(idempotency_key),
    )
    .await?;

    let bonus = referral_service::award_topup_bonus(&mut uow, user_id, &transaction).await?;

    uow.commit().await?;

    tracing::info!(%user_id, %amount, ?bonus, "top-up credited");
    Ok(transaction)
}

const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

fn normalize_idempotency_key(key: Option<String>) -> Result<Option<String>, AppError> {
    let Some(key) = key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()) else {
        return Ok(None);
    };
    if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(AppError::InvalidRequest(format!(
            "Idempotency key must be at most {MAX_IDEMPOTENCY_KEY_LEN} bytes"
        )));
    }
    Ok(Some(key))
}

/// Move referral earnings into the spendable main balance.
///
/// Returns the `(referral debit, main credit)` transaction pair.
pub async fn transfer_referral_to_main<S: LedgerStore>(
    store: &S,
    user_id: Uuid,
    amount: Decimal,
) -> Result<(Transaction, Transaction), AppError> {
    let mut uow = store.begin().await?;

    let out = debit(
        &mut uow,
        user_id,
        amount,
        BalanceType::Referral,
        LedgerEntry::new(TransactionType::Transfer, "Transfer to main balance"),
    )
    .await?;
    let inbound = credit(
        &mut uow,
        user_id,
        amount,
        BalanceType::Main,
        LedgerEntry::new(TransactionType::Transfer, "Transfer from referral balance")
            .with_reference(out.id),
    )
    .await?;

    uow.commit().await?;

    tracing::info!(%user_id, amount = %inbound.amount, "referral balance transferred to main");
    Ok((out, inbound))
}

/// A page of the user's transactions, newest first.
pub async fn list_transactions<S: LedgerStore>(
    store: &S,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<Transaction>, AppError> {
    store.list_transactions(user_id, limit, offset).await
}
