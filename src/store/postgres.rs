//! PostgreSQL implementation of the ledger store.
//!
//! A unit of work is a database transaction. Row locks are taken with
//! `SELECT ... FOR UPDATE` and released on commit or rollback; dropping a
//! `PgUnitOfWork` without committing rolls it back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction as DbTransaction};
use uuid::Uuid;

use super::{LedgerStore, UnitOfWork};
use crate::db::DbPool;
use crate::error::AppError;
use crate::models::{
    api_key::ApiKey,
    catalog::{Product, UserProfile},
    order::{Order, OrderItem, OrderStatus},
    referral::{ProductReferralPurchase, ReferralEarning},
    tariff::Tariff,
    transaction::Transaction,
    wallet::Wallet,
    withdrawal::WithdrawalRequest,
};

const WALLET_COLUMNS: &str = "user_id, main_balance, referral_balance, currency, updated_at";
const USER_COLUMNS: &str =
    "id, tariff, tariff_expires_at, referred_by, referral_expires_at, referral_id";
const PRODUCT_COLUMNS: &str = "id, seller_id, status, price, discount_price, partner_percent, \
     is_referral_enabled, referral_commission_percent";
const ORDER_COLUMNS: &str = "id, order_number, buyer_id, seller_id, total_amount, payment_method, \
     status, referral_id, referral_commission, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
    currency: String,
}

impl PgStore {
    /// `currency` is assigned to wallets created by this store.
    pub fn new(pool: DbPool, currency: impl Into<String>) -> Self {
        Self {
            pool,
            currency: currency.into(),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Look up an active API key by its SHA-256 hash.
    pub async fn find_api_key(&self, key_hash: &str) -> Result<Option<ApiKey>, AppError> {
        let key = sqlx::query_as::<_, ApiKey>(
            "SELECT id, key_hash, user_id, is_admin, created_at, is_active
             FROM api_keys
             WHERE key_hash = $1 AND is_active = true",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    type Uow = PgUnitOfWork;

    async fn begin(&self) -> Result<PgUnitOfWork, AppError> {
        let tx = self.pool.begin().await?;
        Ok(PgUnitOfWork {
            tx,
            currency: self.currency.clone(),
        })
    }

    async fn find_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>, AppError> {
        let wallet = sqlx::query_as::<_, Wallet>(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(wallet)
    }

    async fn list_transactions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, AppError> {
        let transactions = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, user_id, type, amount, balance_type, description,
                   reference_id, status, idempotency_key, created_at
            FROM transactions
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    async fn find_order(&self, order_id: Uuid) -> Result<Option<Order>, AppError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(mut order) = order else {
            return Ok(None);
        };
        order.items = sqlx::query_as::<_, OrderItem>(
            "SELECT product_id, quantity, unit_price, discount_price, product_referrer_id
             FROM order_items WHERE order_id = $1 ORDER BY position",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(order))
    }

    async fn list_withdrawals(&self, user_id: Uuid) -> Result<Vec<WithdrawalRequest>, AppError> {
        let requests = sqlx::query_as::<_, WithdrawalRequest>(
            "SELECT * FROM withdrawal_requests WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(requests)
    }

    async fn expired_subscribers(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, AppError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM users
            WHERE tariff IN ('pro', 'business')
              AND (tariff_expires_at IS NULL OR tariff_expires_at <= $1)
            ORDER BY id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

/// A PostgreSQL transaction acting as a ledger unit of work.
pub struct PgUnitOfWork {
    tx: DbTransaction<'static, Postgres>,
    currency: String,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn wallet_for_update(&mut self, user_id: Uuid) -> Result<Wallet, AppError> {
        // Lazily create the wallet; a concurrent creator simply wins the insert
        sqlx::query(
            "INSERT INTO wallets (user_id, currency) VALUES ($1, $2)
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(&self.currency)
        .execute(&mut *self.tx)
        .await?;

        let wallet = sqlx::query_as::<_, Wallet>(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE user_id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(wallet)
    }

    async fn save_wallet(&mut self, wallet: &Wallet) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE wallets
            SET main_balance = $1,
                referral_balance = $2,
                updated_at = NOW()
            WHERE user_id = $3
            "#,
        )
        .bind(wallet.main_balance)
        .bind(wallet.referral_balance)
        .bind(wallet.user_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, user_id, type, amount, balance_type,
                description, reference_id, status, idempotency_key, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.user_id)
        .bind(transaction.transaction_type)
        .bind(transaction.amount)
        .bind(transaction.balance_type)
        .bind(&transaction.description)
        .bind(transaction.reference_id)
        .bind(transaction.status)
        .bind(&transaction.idempotency_key)
        .bind(transaction.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn find_transaction_by_idempotency_key(
        &mut self,
        key: &str,
    ) -> Result<Option<Transaction>, AppError> {
        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, user_id, type, amount, balance_type, description,
                   reference_id, status, idempotency_key, created_at
            FROM transactions
            WHERE idempotency_key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(transaction)
    }

    async fn get_product(&mut self, product_id: Uuid) -> Result<Option<Product>, AppError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(product_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(product)
    }

    async fn get_user(&mut self, user_id: Uuid) -> Result<Option<UserProfile>, AppError> {
        let user = sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(user)
    }

    async fn user_for_update(&mut self, user_id: Uuid) -> Result<Option<UserProfile>, AppError> {
        let user = sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(user)
    }

    async fn find_user_by_referral_code(
        &mut self,
        code: &str,
    ) -> Result<Option<UserProfile>, AppError> {
        let user = sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE referral_id = $1"
        ))
        .bind(code)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(user)
    }

    async fn update_tariff(
        &mut self,
        user_id: Uuid,
        tariff: Tariff,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET tariff = $1, tariff_expires_at = $2 WHERE id = $3")
            .bind(tariff)
            .bind(expires_at)
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn disable_seller_referral_programs(
        &mut self,
        seller_id: Uuid,
    ) -> Result<u64, AppError> {
        let changed = sqlx::query(
            r#"
            UPDATE products
            SET is_referral_enabled = false,
                referral_commission_percent = 0,
                partner_percent = 0
            WHERE seller_id = $1
              AND (is_referral_enabled OR referral_commission_percent <> 0 OR partner_percent <> 0)
            "#,
        )
        .bind(seller_id)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        Ok(changed)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, buyer_id, seller_id, total_amount, payment_method,
                status, referral_id, referral_commission, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order.id)
        .bind(&order.order_number)
        .bind(order.buyer_id)
        .bind(order.seller_id)
        .bind(order.total_amount)
        .bind(order.payment_method)
        .bind(order.status)
        .bind(order.referral_id)
        .bind(order.referral_commission)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    order_id, position, product_id, quantity,
                    unit_price, discount_price, product_referrer_id
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(order.id)
            .bind(position as i32)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.discount_price)
            .bind(item.product_referrer_id)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn order_for_update(&mut self, order_id: Uuid) -> Result<Option<Order>, AppError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(mut order) = order else {
            return Ok(None);
        };
        order.items = sqlx::query_as::<_, OrderItem>(
            "SELECT product_id, quantity, unit_price, discount_price, product_referrer_id
             FROM order_items WHERE order_id = $1 ORDER BY position",
        )
        .bind(order_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(Some(order))
    }

    async fn set_order_status(
        &mut self,
        order_id: Uuid,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE orders SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(status)
            .bind(at)
            .bind(order_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn insert_referral_earning(&mut self, earning: &ReferralEarning) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO referral_earnings (
                id, referrer_id, referee_id, transaction_id, referrer_transaction_id,
                topup_amount, earning_amount, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(earning.id)
        .bind(earning.referrer_id)
        .bind(earning.referee_id)
        .bind(earning.transaction_id)
        .bind(earning.referrer_transaction_id)
        .bind(earning.topup_amount)
        .bind(earning.earning_amount)
        .bind(earning.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_product_referral_purchase(
        &mut self,
        purchase: &ProductReferralPurchase,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO product_referral_purchases (
                id, referrer_id, buyer_id, product_id, order_id,
                commission_percent, commission_amount, status, created_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(purchase.id)
        .bind(purchase.referrer_id)
        .bind(purchase.buyer_id)
        .bind(purchase.product_id)
        .bind(purchase.order_id)
        .bind(purchase.commission_percent)
        .bind(purchase.commission_amount)
        .bind(purchase.status)
        .bind(purchase.created_at)
        .bind(purchase.completed_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn pending_product_referral_purchases(
        &mut self,
        order_id: Uuid,
    ) -> Result<Vec<ProductReferralPurchase>, AppError> {
        let purchases = sqlx::query_as::<_, ProductReferralPurchase>(
            r#"
            SELECT * FROM product_referral_purchases
            WHERE order_id = $1 AND status = 'pending'
            ORDER BY created_at, id
            FOR UPDATE
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(purchases)
    }

    async fn complete_product_referral_purchase(
        &mut self,
        purchase_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE product_referral_purchases
             SET status = 'completed', completed_at = $1
             WHERE id = $2 AND status = 'pending'",
        )
        .bind(at)
        .bind(purchase_id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_withdrawal(&mut self, request: &WithdrawalRequest) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO withdrawal_requests (
                id, user_id, amount, balance_type, method, destination,
                status, admin_note, rejection_reason, created_at, processed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(request.id)
        .bind(request.user_id)
        .bind(request.amount)
        .bind(request.balance_type)
        .bind(&request.method)
        .bind(&request.destination)
        .bind(request.status)
        .bind(&request.admin_note)
        .bind(&request.rejection_reason)
        .bind(request.created_at)
        .bind(request.processed_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn withdrawal_for_update(
        &mut self,
        withdrawal_id: Uuid,
    ) -> Result<Option<WithdrawalRequest>, AppError> {
        let request = sqlx::query_as::<_, WithdrawalRequest>(
            "SELECT * FROM withdrawal_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(withdrawal_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(request)
    }

    async fn save_withdrawal(&mut self, request: &WithdrawalRequest) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE withdrawal_requests
            SET status = $1,
                admin_note = $2,
                rejection_reason = $3,
                processed_at = $4
            WHERE id = $5
            "#,
        )
        .bind(request.status)
        .bind(&request.admin_note)
        .bind(&request.rejection_reason)
        .bind(request.processed_at)
        .bind(request.id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn commit(self) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }
}
