//! In-process implementation of the ledger store.
//!
//! Rows live in plain maps behind a short-lived `std::sync::Mutex` that is
//! never held across an `.await`. Row locks are per-key `tokio` mutexes
//! owned by the unit of work until it is committed or dropped. Writes are
//! staged inside the unit of work and published in one step on commit, so
//! other units never observe a half-finished operation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};
use uuid::Uuid;

use super::{LedgerStore, UnitOfWork};
use crate::error::AppError;
use crate::models::{
    catalog::{Product, UserProfile},
    order::{Order, OrderStatus},
    referral::{ProductReferralPurchase, ReferralEarning, ReferralPurchaseStatus},
    tariff::Tariff,
    transaction::Transaction,
    wallet::Wallet,
    withdrawal::WithdrawalRequest,
};

#[derive(Default, Clone)]
struct Tables {
    wallets: HashMap<Uuid, Wallet>,
    transactions: Vec<Transaction>,
    users: HashMap<Uuid, UserProfile>,
    products: HashMap<Uuid, Product>,
    orders: HashMap<Uuid, Order>,
    referral_earnings: Vec<ReferralEarning>,
    product_referral_purchases: HashMap<Uuid, ProductReferralPurchase>,
    withdrawals: HashMap<Uuid, WithdrawalRequest>,
}

impl Tables {
    /// Publish the writes staged by a unit of work.
    fn merge(&mut self, staged: Tables) {
        self.wallets.extend(staged.wallets);
        self.transactions.extend(staged.transactions);
        self.users.extend(staged.users);
        self.products.extend(staged.products);
        self.orders.extend(staged.orders);
        self.referral_earnings.extend(staged.referral_earnings);
        self.product_referral_purchases
            .extend(staged.product_referral_purchases);
        self.withdrawals.extend(staged.withdrawals);
    }
}

struct Shared {
    currency: String,
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<Uuid, Arc<RowLock<()>>>>,
}

impl Shared {
    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        // A panic while holding the guard cannot leave a half-merged unit
        // behind, so the data is still consistent after poisoning.
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn row_lock(&self, key: Uuid) -> Arc<RowLock<()>> {
        let mut locks = self.row_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(key).or_default().clone()
    }

    /// Forget row locks nobody holds or waits for. Callers must have
    /// dropped their guards for `keys` already.
    fn release_row_locks(&self, keys: impl IntoIterator<Item = Uuid>) {
        let mut locks = self.row_locks.lock().unwrap_or_else(|e| e.into_inner());
        for key in keys {
            if locks.get(&key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(&key);
            }
        }
    }
}

/// Ledger store kept entirely in memory.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new("USD")
    }
}

impl MemoryStore {
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                currency: currency.into(),
                tables: Mutex::new(Tables::default()),
                row_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a user profile, as the profile service would.
    pub fn put_user(&self, user: UserProfile) {
        self.shared.tables().users.insert(user.id, user);
    }

    /// Register a product, as the catalog would.
    pub fn put_product(&self, product: Product) {
        self.shared.tables().products.insert(product.id, product);
    }

    pub fn user(&self, user_id: Uuid) -> Option<UserProfile> {
        self.shared.tables().users.get(&user_id).cloned()
    }

    pub fn product(&self, product_id: Uuid) -> Option<Product> {
        self.shared.tables().products.get(&product_id).cloned()
    }

    /// Every transaction of a user, oldest first.
    pub fn transactions_of(&self, user_id: Uuid) -> Vec<Transaction> {
        self.shared
            .tables()
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn referral_earnings(&self) -> Vec<ReferralEarning> {
        self.shared.tables().referral_earnings.clone()
    }

    pub fn product_referral_purchases(&self, order_id: Uuid) -> Vec<ProductReferralPurchase> {
        let mut purchases: Vec<_> = self
            .shared
            .tables()
            .product_referral_purchases
            .values()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect();
        purchases.sort_by_key(|p| (p.created_at, p.id));
        purchases
    }

    /// Number of orders stored, committed ones only.
    pub fn order_count(&self) -> usize {
        self.shared.tables().orders.len()
    }

    #[cfg(test)]
    fn row_lock_count(&self) -> usize {
        self.shared
            .row_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    type Uow = MemoryUnitOfWork;

    async fn begin(&self) -> Result<MemoryUnitOfWork, AppError> {
        Ok(MemoryUnitOfWork {
            shared: self.shared.clone(),
            locks: HashMap::new(),
            staged: Tables::default(),
        })
    }

    async fn find_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>, AppError> {
        Ok(self.shared.tables().wallets.get(&user_id).cloned())
    }

    async fn list_transactions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, AppError> {
        let mut transactions = self.transactions_of(user_id);
        transactions.reverse();
        Ok(transactions
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn find_order(&self, order_id: Uuid) -> Result<Option<Order>, AppError> {
        Ok(self.shared.tables().orders.get(&order_id).cloned())
    }

    async fn list_withdrawals(&self, user_id: Uuid) -> Result<Vec<WithdrawalRequest>, AppError> {
        let mut requests: Vec<_> = self
            .shared
            .tables()
            .withdrawals
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn expired_subscribers(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, AppError> {
        let mut ids: Vec<Uuid> = self
            .shared
            .tables()
            .users
            .values()
            .filter(|u| u.subscription_expired(now))
            .map(|u| u.id)
            .collect();
        ids.sort();
        Ok(ids)
    }
}

/// Unit of work over a [`MemoryStore`].
pub struct MemoryUnitOfWork {
    shared: Arc<Shared>,
    locks: HashMap<Uuid, OwnedMutexGuard<()>>,
    staged: Tables,
}

impl Drop for MemoryUnitOfWork {
    fn drop(&mut self) {
        let keys: Vec<Uuid> = self.locks.keys().copied().collect();
        self.locks.clear();
        self.shared.release_row_locks(keys);
    }
}

impl MemoryUnitOfWork {
    /// Acquire the row lock for `key` unless this unit already holds it.
    async fn lock(&mut self, key: Uuid) {
        if self.locks.contains_key(&key) {
            return;
        }
        let lock = self.shared.row_lock(key);
        let guard = lock.lock_owned().await;
        self.locks.insert(key, guard);
    }

    fn user(&self, user_id: Uuid) -> Option<UserProfile> {
        self.staged
            .users
            .get(&user_id)
            .cloned()
            .or_else(|| self.shared.tables().users.get(&user_id).cloned())
    }

    fn order(&self, order_id: Uuid) -> Option<Order> {
        self.staged
            .orders
            .get(&order_id)
            .cloned()
            .or_else(|| self.shared.tables().orders.get(&order_id).cloned())
    }

    fn withdrawal(&self, withdrawal_id: Uuid) -> Option<WithdrawalRequest> {
        self.staged
            .withdrawals
            .get(&withdrawal_id)
            .cloned()
            .or_else(|| self.shared.tables().withdrawals.get(&withdrawal_id).cloned())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn wallet_for_update(&mut self, user_id: Uuid) -> Result<Wallet, AppError> {
        self.lock(user_id).await;
        if let Some(wallet) = self.staged.wallets.get(&user_id) {
            return Ok(wallet.clone());
        }
        let wallet = self
            .shared
            .tables()
            .wallets
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| Wallet::empty(user_id, &self.shared.currency));
        self.staged.wallets.insert(user_id, wallet.clone());
        Ok(wallet)
    }

    async fn save_wallet(&mut self, wallet: &Wallet) -> Result<(), AppError> {
        if !self.locks.contains_key(&wallet.user_id) {
            return Err(AppError::LedgerInvariant(format!(
                "wallet {} saved without being locked",
                wallet.user_id
            )));
        }
        self.staged.wallets.insert(wallet.user_id, wallet.clone());
        Ok(())
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<(), AppError> {
        if let Some(key) = &transaction.idempotency_key {
            if self.find_transaction_by_idempotency_key(key).await?.is_some() {
                return Err(AppError::InvalidState(format!(
                    "idempotency key {key} already used"
                )));
            }
        }
        self.staged.transactions.push(transaction.clone());
        Ok(())
    }

    async fn find_transaction_by_idempotency_key(
        &mut self,
        key: &str,
    ) -> Result<Option<Transaction>, AppError> {
        let matches = |t: &&Transaction| t.idempotency_key.as_deref() == Some(key);
        if let Some(found) = self.staged.transactions.iter().find(matches) {
            return Ok(Some(found.clone()));
        }
        Ok(self
            .shared
            .tables()
            .transactions
            .iter()
            .find(matches)
            .cloned())
    }

    async fn get_product(&mut self, product_id: Uuid) -> Result<Option<Product>, AppError> {
        Ok(self
            .staged
            .products
            .get(&product_id)
            .cloned()
            .or_else(|| self.shared.tables().products.get(&product_id).cloned()))
    }

    async fn get_user(&mut self, user_id: Uuid) -> Result<Option<UserProfile>, AppError> {
        Ok(self.user(user_id))
    }

    async fn user_for_update(&mut self, user_id: Uuid) -> Result<Option<UserProfile>, AppError> {
        self.lock(user_id).await;
        Ok(self.user(user_id))
    }

    async fn find_user_by_referral_code(
        &mut self,
        code: &str,
    ) -> Result<Option<UserProfile>, AppError> {
        let id = self
            .shared
            .tables()
            .users
            .values()
            .find(|u| u.referral_id.as_deref() == Some(code))
            .map(|u| u.id);
        Ok(id.and_then(|id| self.user(id)))
    }

    async fn update_tariff(
        &mut self,
        user_id: Uuid,
        tariff: Tariff,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        let mut user = self.user(user_id).ok_or(AppError::NotFound("user"))?;
        user.tariff = tariff;
        user.tariff_expires_at = expires_at;
        self.staged.users.insert(user_id, user);
        Ok(())
    }

    async fn disable_seller_referral_programs(
        &mut self,
        seller_id: Uuid,
    ) -> Result<u64, AppError> {
        let mut products: HashMap<Uuid, Product> = self
            .shared
            .tables()
            .products
            .values()
            .filter(|p| p.seller_id == seller_id)
            .map(|p| (p.id, p.clone()))
            .collect();
        products.extend(
            self.staged
                .products
                .values()
                .filter(|p| p.seller_id == seller_id)
                .map(|p| (p.id, p.clone())),
        );

        let mut changed = 0;
        for (id, mut product) in products {
            if !product.is_referral_enabled
                && product.referral_commission_percent.is_zero()
                && product.partner_percent.is_zero()
            {
                continue;
            }
            product.is_referral_enabled = false;
            product.referral_commission_percent = Decimal::ZERO;
            product.partner_percent = Decimal::ZERO;
            self.staged.products.insert(id, product);
            changed += 1;
        }
        Ok(changed)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), AppError> {
        let taken = self
            .shared
            .tables()
            .orders
            .values()
            .chain(self.staged.orders.values())
            .any(|o| o.order_number == order.order_number);
        if taken {
            return Err(AppError::InvalidState(format!(
                "order number {} already exists",
                order.order_number
            )));
        }
        self.staged.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn order_for_update(&mut self, order_id: Uuid) -> Result<Option<Order>, AppError> {
        self.lock(order_id).await;
        Ok(self.order(order_id))
    }

    async fn set_order_status(
        &mut self,
        order_id: Uuid,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut order = self.order(order_id).ok_or(AppError::NotFound("order"))?;
        order.status = status;
        order.updated_at = at;
        self.staged.orders.insert(order_id, order);
        Ok(())
    }

    async fn insert_referral_earning(&mut self, earning: &ReferralEarning) -> Result<(), AppError> {
        self.staged.referral_earnings.push(earning.clone());
        Ok(())
    }

    async fn insert_product_referral_purchase(
        &mut self,
        purchase: &ProductReferralPurchase,
    ) -> Result<(), AppError> {
        self.staged
            .product_referral_purchases
            .insert(purchase.id, purchase.clone());
        Ok(())
    }

    async fn pending_product_referral_purchases(
        &mut self,
        order_id: Uuid,
    ) -> Result<Vec<ProductReferralPurchase>, AppError> {
        // Purchases are only touched while their order is locked
        self.lock(order_id).await;

        let mut purchases: HashMap<Uuid, ProductReferralPurchase> = self
            .shared
            .tables()
            .product_referral_purchases
            .values()
            .filter(|p| p.order_id == order_id)
            .map(|p| (p.id, p.clone()))
            .collect();
        purchases.extend(
            self.staged
                .product_referral_purchases
                .values()
                .filter(|p| p.order_id == order_id)
                .map(|p| (p.id, p.clone())),
        );

        let mut pending: Vec<_> = purchases
            .into_values()
            .filter(|p| p.status == ReferralPurchaseStatus::Pending)
            .collect();
        pending.sort_by_key(|p| (p.created_at, p.id));
        Ok(pending)
    }

    async fn complete_product_referral_purchase(
        &mut self,
        purchase_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut purchase = self
            .staged
            .product_referral_purchases
            .get(&purchase_id)
            .cloned()
            .or_else(|| {
                self.shared
                    .tables()
                    .product_referral_purchases
                    .get(&purchase_id)
                    .cloned()
            })
            .ok_or(AppError::NotFound("product referral purchase"))?;
        if purchase.status == ReferralPurchaseStatus::Pending {
            purchase.status = ReferralPurchaseStatus::Completed;
            purchase.completed_at = Some(at);
            self.staged
                .product_referral_purchases
                .insert(purchase_id, purchase);
        }
        Ok(())
    }

    async fn insert_withdrawal(&mut self, request: &WithdrawalRequest) -> Result<(), AppError> {
        self.staged.withdrawals.insert(request.id, request.clone());
        Ok(())
    }

    async fn withdrawal_for_update(
        &mut self,
        withdrawal_id: Uuid,
    ) -> Result<Option<WithdrawalRequest>, AppError> {
        self.lock(withdrawal_id).await;
        Ok(self.withdrawal(withdrawal_id))
    }

    async fn save_withdrawal(&mut self, request: &WithdrawalRequest) -> Result<(), AppError> {
        self.staged.withdrawals.insert(request.id, request.clone());
        Ok(())
    }

    async fn commit(mut self) -> Result<(), AppError> {
        let staged = std::mem::take(&mut self.staged);
        self.shared.tables().merge(staged);
        // Row locks are released in `Drop`, after the merge
        Ok(())
    }
}
