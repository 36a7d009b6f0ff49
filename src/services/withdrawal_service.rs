//! Withdrawal lifecycle.
//!
//! Funds are escrowed when the request is created: the requested balance is
//! debited immediately. Approval only changes the status, rejection refunds
//! the full amount to the balance it came from.

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    money::validate_amount,
    transaction::{LedgerEntry, TransactionType},
    withdrawal::{CreateWithdrawalRequest, WithdrawalRequest, WithdrawalStatus},
};
use crate::services::wallet_service;
use crate::store::{LedgerStore, UnitOfWork};

/// Create a pending withdrawal and escrow its amount.
///
/// # Errors
///
/// - `BelowMinimum`: `amount` is under `minimum`
/// - `InsufficientFunds`: the chosen balance cannot cover `amount`
/// - `InvalidRequest`: malformed amount, empty method or destination
pub async fn request_withdrawal<S: LedgerStore>(
    store: &S,
    user_id: Uuid,
    request: CreateWithdrawalRequest,
    minimum: Decimal,
) -> Result<WithdrawalRequest, AppError> {
    let amount = validate_amount(request.amount)?;
    if amount < minimum {
        return Err(AppError::BelowMinimum { minimum });
    }
    let method = request.method.trim();
    let destination = request.destination.trim();
    if method.is_empty() || destination.is_empty() {
        return Err(AppError::InvalidRequest(
            "Withdrawal method and destination are required".to_string(),
        ));
    }

    let withdrawal = WithdrawalRequest {
        id: Uuid::new_v4(),
        user_id,
        amount,
        balance_type: request.balance_type,
        method: method.to_string(),
        destination: destination.to_string(),
        status: WithdrawalStatus::Pending,
        admin_note: None,
        rejection_reason: None,
        created_at: Utc::now(),
        processed_at: None,
    };

    let mut uow = store.begin().await?;
    wallet_service::debit(
        &mut uow,
        user_id,
        amount,
        withdrawal.balance_type,
        LedgerEntry::new(
            TransactionType::Withdrawal,
            format!("Withdrawal via {}", withdrawal.method),
        )
        .with_reference(withdrawal.id),
    )
    .await?;
    uow.insert_withdrawal(&withdrawal).await?;
    uow.commit().await?;

    tracing::info!(
        withdrawal_id = %withdrawal.id,
        %user_id,
        %amount,
        balance_type = %withdrawal.balance_type,
        "withdrawal requested"
    );
    Ok(withdrawal)
}

/// Mark a pending withdrawal as paid out. Balances are not touched.
pub async fn approve_withdrawal<S: LedgerStore>(
    store: &S,
    withdrawal_id: Uuid,
    note: Option<String>,
) -> Result<WithdrawalRequest, AppError> {
    let mut uow = store.begin().await?;
    let mut withdrawal = uow
        .withdrawal_for_update(withdrawal_id)
        .await?
        .ok_or(AppError::NotFound("withdrawal"))?;
    withdrawal.ensure_pending()?;

    withdrawal.status = WithdrawalStatus::Completed;
    withdrawal.admin_note = note.filter(|n| !n.trim().is_empty());
    withdrawal.processed_at = Some(Utc::now());
    uow.save_withdrawal(&withdrawal).await?;
    uow.commit().await?;

    tracing::info!(%withdrawal_id, amount = %withdrawal.amount, "withdrawal approved");
    Ok(withdrawal)
}

/// Reject a pending withdrawal and return its amount to the original balance.
///
/// # Errors
///
/// - `InvalidRequest`: `reason` is blank
/// - `NotFound`: unknown withdrawal
/// - `InvalidState`: the request is no longer pending
pub async fn reject_withdrawal<S: LedgerStore>(
    store: &S,
    withdrawal_id: Uuid,
    reason: &str,
) -> Result<WithdrawalRequest, AppError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(AppError::InvalidRequest(
            "A rejection reason is required".to_string(),
        ));
    }

    let mut uow = store.begin().await?;
    let mut withdrawal = uow
        .withdrawal_for_update(withdrawal_id)
        .await?
        .ok_or(AppError::NotFound("withdrawal"))?;
    withdrawal.ensure_pending()?;

    wallet_service::credit(
        &mut uow,
        withdrawal.user_id,
        withdrawal.amount,
        withdrawal.balance_type,
        LedgerEntry::new(
            TransactionType::WithdrawalRefund,
            format!("Withdrawal rejected: {reason}"),
        )
        .with_reference(withdrawal.id),
    )
    .await?;

    withdrawal.status = WithdrawalStatus::Rejected;
    withdrawal.rejection_reason = Some(reason.to_string());
    withdrawal.processed_at = Some(Utc::now());
    uow.save_withdrawal(&withdrawal).await?;
    uow.commit().await?;

    tracing::info!(%withdrawal_id, amount = %withdrawal.amount, reason, "withdrawal rejected");
    Ok(withdrawal)
}

pub async fn list_withdrawals<S: LedgerStore>(
    store: &S,
    user_id: Uuid,
) -> Result<Vec<WithdrawalRequest>, AppError> {
    store.list_withdrawals(user_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::wallet::BalanceType;
    use crate::services::wallet_service::{credit, get_wallet};
    use crate::store::MemoryStore;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    async fn seed_referral(store: &MemoryStore, user: Uuid, amount: &str) {
        let mut uow = store.begin().await.unwrap();
        credit(
            &mut uow,
            user,
            d(amount),
            BalanceType::Referral,
            LedgerEntry::new(TransactionType::ReferralCommission, "seed"),
        )
        .await
        .unwrap();
        uow.commit().await.unwrap();
    }

    fn request(amount: &str) -> CreateWithdrawalRequest {
        CreateWithdrawalRequest {
            amount: d(amount),
            balance_type: BalanceType::Referral,
            method: "card".to_string(),
            destination: "4111 1111 1111 1111".to_string(),
        }
    }

    #[tokio::test]
    async fn rejection_restores_the_escrowed_amount() {
        let store = MemoryStore::default();
        let user = Uuid::new_v4();
        seed_referral(&store, user, "1000.00").await;

        let withdrawal = request_withdrawal(&store, user, request("1000.00"), d("100.00"))
            .await
            .unwrap();
        assert_eq!(withdrawal.status, WithdrawalStatus::Pending);
        assert!(get_wallet(&store, user).await.unwrap().referral_balance.is_zero());

        let rejected = reject_withdrawal(&store, withdrawal.id, "invalid account")
            .await
            .unwrap();
        assert_eq!(rejected.status, WithdrawalStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("invalid account"));
        assert_eq!(
            get_wallet(&store, user).await.unwrap().referral_balance,
            d("1000.00")
        );

        let types: Vec<_> = store
            .transactions_of(user)
            .iter()
            .map(|t| t.transaction_type)
            .collect();
        assert_eq!(
            types,
            vec![
                TransactionType::ReferralCommission,
                TransactionType::Withdrawal,
                TransactionType::WithdrawalRefund
            ]
        );

        assert!(matches!(
            approve_withdrawal(&store, withdrawal.id, None).await,
            Err(AppError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn approval_keeps_the_post_request_balance() {
        let store = MemoryStore::default();
        let user = Uuid::new_v4();
        seed_referral(&store, user, "500.00").await;

        let withdrawal = request_withdrawal(&store, user, request("200.00"), d("100.00"))
            .await
            .unwrap();
        let approved = approve_withdrawal(&store, withdrawal.id, Some("paid".to_string()))
            .await
            .unwrap();

        assert_eq!(approved.status, WithdrawalStatus::Completed);
        assert!(approved.processed_at.is_some());
        assert_eq!(
            get_wallet(&store, user).await.unwrap().referral_balance,
            d("300.00")
        );
        assert!(matches!(
            reject_withdrawal(&store, withdrawal.id, "late").await,
            Err(AppError::InvalidState(_))
        ));
        assert_eq!(list_withdrawals(&store, user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn validates_before_touching_the_wallet() {
        let store = MemoryStore::default();
        let user = Uuid::new_v4();
        seed_referral(&store, user, "50.00").await;

        assert!(matches!(
            request_withdrawal(&store, user, request("99.99"), d("100.00")).await,
            Err(AppError::BelowMinimum { .. })
        ));
        assert!(matches!(
            request_withdrawal(&store, user, request("50.01"), d("10.00")).await,
            Err(AppError::InsufficientFunds)
        ));
        assert!(list_withdrawals(&store, user).await.unwrap().is_empty());
        assert_eq!(store.transactions_of(user).len(), 1);

        let withdrawal = request_withdrawal(&store, user, request("10.00"), d("10.00"))
            .await
            .unwrap();
        assert!(matches!(
            reject_withdrawal(&store, withdrawal.id, "   ").await,
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_never_overdraw() {
        let store = MemoryStore::default();
        let user = Uuid::new_v4();
        seed_referral(&store, user, "1000.00").await;

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    request_withdrawal(&store, user, request("300.00"), d("100.00")).await
                })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(AppError::InsufficientFunds) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(accepted, 3);
        assert_eq!(
            get_wallet(&store, user).await.unwrap().referral_balance,
            d("100.00")
        );
    }
}
