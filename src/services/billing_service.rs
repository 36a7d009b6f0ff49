//! # Tariff billing
//!
//! Paid tiers (`pro`, `business`) last 30 days. When a subscription runs
//! out, the billing sweep either renews it from the user's main balance or
//! drops the user to `free`:
//!
//! ```text
//! BillingScheduler (background task)
//!        │
//!        └── every BILLING_INTERVAL_SECS
//!              │
//!              ├── list expired paid subscribers
//!              │
//!              └── per user, own unit of work
//!                    ├── main balance ≥ price → debit, extend 30 days
//!                    └── otherwise           → downgrade to free
//!                                              (business: disable referral programs)
//! ```
//!
//! Users are billed one at a time; a failure for one user is logged and
//! counted and the sweep moves on.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    catalog::UserProfile,
    tariff::{Tariff, TariffPrices, billing_period},
    transaction::{LedgerEntry, TransactionType},
    wallet::BalanceType,
};
use crate::services::wallet_service;
use crate::store::{LedgerStore, UnitOfWork};

/// What happened to one user during a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingOutcome {
    Renewed { price: Decimal },
    Downgraded { from: Tariff },
    /// The subscription was renewed or changed since the user was listed
    NotDue,
}

/// Counters of one billing sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BillingReport {
    pub processed: usize,
    pub renewed: usize,
    pub downgraded: usize,
    pub failed: usize,
}

/// Bill every paid subscriber whose tier expired at or before `now`.
pub async fn run_billing_sweep<S: LedgerStore>(
    store: &S,
    prices: &TariffPrices,
    now: DateTime<Utc>,
) -> Result<BillingReport, AppError> {
    let due = store.expired_subscribers(now).await?;
    let mut report = BillingReport::default();

    for user_id in due {
        report.processed += 1;
        match bill_user(store, user_id, prices, now).await {
            Ok(BillingOutcome::Renewed { .. }) => report.renewed += 1,
            Ok(BillingOutcome::Downgraded { .. }) => report.downgraded += 1,
            Ok(BillingOutcome::NotDue) => {}
            Err(e) => {
                tracing::error!(%user_id, error = %e, "tariff billing failed");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

/// Renew or downgrade one expired subscriber, atomically.
///
/// A renewal sets the expiry to `now + 30 days`, not the old expiry plus 30.
pub async fn bill_user<S: LedgerStore>(
    store: &S,
    user_id: Uuid,
    prices: &TariffPrices,
    now: DateTime<Utc>,
) -> Result<BillingOutcome, AppError> {
    let mut uow = store.begin().await?;
    let user = uow
        .user_for_update(user_id)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    if !user.subscription_expired(now) {
        return Ok(BillingOutcome::NotDue);
    }
    let Some(price) = user.tariff.monthly_price(prices) else {
        return Ok(BillingOutcome::NotDue);
    };

    let wallet = wallet_service::get_or_create(&mut uow, user_id).await?;

    let outcome = if wallet.main_balance >= price {
        wallet_service::debit(
            &mut uow,
            user_id,
            price,
            BalanceType::Main,
            LedgerEntry::new(
                TransactionType::TariffPurchase,
                format!("{} subscription renewal", user.tariff),
            ),
        )
        .await?;
        uow.update_tariff(user_id, user.tariff, Some(now + billing_period()))
            .await?;
        tracing::info!(%user_id, tariff = %user.tariff, %price, "subscription renewed");
        BillingOutcome::Renewed { price }
    } else {
        uow.update_tariff(user_id, Tariff::Free, None).await?;
        let disabled = if user.tariff == Tariff::Business {
            uow.disable_seller_referral_programs(user_id).await?
        } else {
            0
        };
        tracing::warn!(
            %user_id,
            from = %user.tariff,
            %price,
            balance = %wallet.main_balance,
            products_disabled = disabled,
            "subscription downgraded to free"
        );
        BillingOutcome::Downgraded { from: user.tariff }
    };

    uow.commit().await?;
    Ok(outcome)
}

/// Buy a paid tier for 30 days, paid from the main balance.
///
/// Buying the tier the user already holds extends it from its current
/// expiry. Any other purchase switches tiers immediately.
///
/// # Errors
///
/// - `InvalidRequest`: the free tier cannot be bought
/// - `NotFound`: unknown user
/// - `InsufficientFunds`: main balance is below the price
pub async fn purchase_tariff<S: LedgerStore>(
    store: &S,
    user_id: Uuid,
    tariff: Tariff,
    prices: &TariffPrices,
) -> Result<UserProfile, AppError> {
    let price = tariff
        .monthly_price(prices)
        .ok_or_else(|| AppError::InvalidRequest("Only paid tariffs can be purchased".to_string()))?;
    let now = Utc::now();

    let mut uow = store.begin().await?;
    let mut user = uow
        .user_for_update(user_id)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    wallet_service::debit(
        &mut uow,
        user_id,
        price,
        BalanceType::Main,
        LedgerEntry::new(
            TransactionType::TariffPurchase,
            format!("{tariff} subscription"),
        ),
    )
    .await?;

    let starts_at = match user.tariff_expires_at {
        Some(expires) if user.tariff == tariff && expires > now => expires,
        _ => now,
    };
    let expires_at = starts_at + billing_period();
    uow.update_tariff(user_id, tariff, Some(expires_at)).await?;
    uow.commit().await?;

    user.tariff = tariff;
    user.tariff_expires_at = Some(expires_at);
    tracing::info!(%user_id, %tariff, %price, %expires_at, "tariff purchased");
    Ok(user)
}

/// Background task running the billing sweep on a fixed interval.
///
/// ```rust,ignore
/// let handle = BillingScheduler::new(store, prices, Duration::from_secs(3600)).spawn();
/// ```
pub struct BillingScheduler<S> {
    store: S,
    prices: TariffPrices,
    every: Duration,
}

impl<S: LedgerStore> BillingScheduler<S> {
    pub fn new(store: S, prices: TariffPrices, every: Duration) -> Self {
        Self {
            store,
            prices,
            every,
        }
    }

    /// Run the sweep forever. The first sweep starts immediately.
    pub async fn start(self) {
        tracing::info!(interval_secs = self.every.as_secs(), "starting billing scheduler");

        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match run_billing_sweep(&self.store, &self.prices, Utc::now()).await {
                Ok(report) if report.processed > 0 => {
                    tracing::info!(?report, "billing sweep finished");
                }
                Ok(_) => tracing::debug!("billing sweep found nothing due"),
                Err(e) => tracing::error!(error = %e, "billing sweep failed"),
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.start())
    }
}
