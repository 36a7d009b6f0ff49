//! Ledger storage.
//!
//! Services never talk to a database directly. They open a [`UnitOfWork`]
//! from a [`LedgerStore`], read and lock the rows they need through it, and
//! commit. Dropping a unit of work without committing discards every write
//! made through it.
//!
//! Locking is per row: `wallet_for_update`, `user_for_update`,
//! `order_for_update` and `withdrawal_for_update` hold the row until commit
//! or rollback. Callers touching several wallets lock them in ascending
//! user id order (see `wallet_service::lock_wallets`).
//!
//! Implementations:
//! - `PgStore`: PostgreSQL, `SELECT ... FOR UPDATE` inside a transaction
//! - `MemoryStore`: in-process, per-key async mutexes and staged writes

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    catalog::{Product, UserProfile},
    order::{Order, OrderStatus},
    referral::{ProductReferralPurchase, ReferralEarning},
    tariff::Tariff,
    transaction::Transaction,
    wallet::Wallet,
    withdrawal::WithdrawalRequest,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Entry point to the ledger's storage.
#[async_trait]
pub trait LedgerStore: Clone + Send + Sync + 'static {
    type Uow: UnitOfWork;

    /// Start a new atomic unit of work.
    async fn begin(&self) -> Result<Self::Uow, AppError>;

    /// Wallet of a user without creating or locking it.
    async fn find_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>, AppError>;

    /// A user's transactions, newest first.
    async fn list_transactions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, AppError>;

    async fn find_order(&self, order_id: Uuid) -> Result<Option<Order>, AppError>;

    /// A user's withdrawal requests, newest first.
    async fn list_withdrawals(&self, user_id: Uuid) -> Result<Vec<WithdrawalRequest>, AppError>;

    /// Users on a paid tier whose subscription ended at or before `now`.
    async fn expired_subscribers(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, AppError>;
}

/// One atomic unit of work against the ledger.
#[async_trait]
pub trait UnitOfWork: Send {
    // Wallets and transactions

    /// Lock a user's wallet, creating an empty one first if needed.
    async fn wallet_for_update(&mut self, user_id: Uuid) -> Result<Wallet, AppError>;

    /// Persist balances of a wallet previously returned by `wallet_for_update`.
    async fn save_wallet(&mut self, wallet: &Wallet) -> Result<(), AppError>;

    /// Fails if `transaction.idempotency_key` is already taken.
    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<(), AppError>;

    async fn find_transaction_by_idempotency_key(
        &mut self,
        key: &str,
    ) -> Result<Option<Transaction>, AppError>;

    // Catalog and users

    async fn get_product(&mut self, product_id: Uuid) -> Result<Option<Product>, AppError>;

    async fn get_user(&mut self, user_id: Uuid) -> Result<Option<UserProfile>, AppError>;

    /// Lock a user's profile row.
    async fn user_for_update(&mut self, user_id: Uuid) -> Result<Option<UserProfile>, AppError>;

    async fn find_user_by_referral_code(
        &mut self,
        code: &str,
    ) -> Result<Option<UserProfile>, AppError>;

    async fn update_tariff(
        &mut self,
        user_id: Uuid,
        tariff: Tariff,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError>;

    /// Turn off both referral programs on every product of a seller.
    /// Returns how many products were changed.
    async fn disable_seller_referral_programs(&mut self, seller_id: Uuid)
    -> Result<u64, AppError>;

    // Orders

    /// Insert an order together with its items.
    async fn insert_order(&mut self, order: &Order) -> Result<(), AppError>;

    /// Lock an order row and load its items.
    async fn order_for_update(&mut self, order_id: Uuid) -> Result<Option<Order>, AppError>;

    async fn set_order_status(
        &mut self,
        order_id: Uuid,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    // Referrals

    async fn insert_referral_earning(&mut self, earning: &ReferralEarning) -> Result<(), AppError>;

    async fn insert_product_referral_purchase(
        &mut self,
        purchase: &ProductReferralPurchase,
    ) -> Result<(), AppError>;

    /// Lock and return the still pending product referral purchases of an order.
    async fn pending_product_referral_purchases(
        &mut self,
        order_id: Uuid,
    ) -> Result<Vec<ProductReferralPurchase>, AppError>;

    async fn complete_product_referral_purchase(
        &mut self,
        purchase_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    // Withdrawals

    async fn insert_withdrawal(&mut self, request: &WithdrawalRequest) -> Result<(), AppError>;

    async fn withdrawal_for_update(
        &mut self,
        withdrawal_id: Uuid,
    ) -> Result<Option<WithdrawalRequest>, AppError>;

    /// Persist status, notes and `processed_at` of a withdrawal.
    async fn save_withdrawal(&mut self, request: &WithdrawalRequest) -> Result<(), AppError>;

    /// Make every write of this unit visible atomically.
    async fn commit(self) -> Result<(), AppError>;
}
