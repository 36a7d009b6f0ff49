//! Order settlement engine.
//!
//! Checkout moves money buyer → seller → referrer inside one unit of work:
//!
//! 1. Validate products (exist, belong to the seller, active)
//! 2. Price the order and find the seller's partner percentage
//! 3. Resolve the referral code if the seller's Business tier is active
//! 4. Insert the order
//! 5. Wallet payment: debit buyer, credit seller the full total
//! 6. Charge the partner commission to the seller and pay the referrer,
//!    or skip it if the seller cannot cover it
//! 7. Record pending product referral purchases
//!
//! Completing an order later pays out its pending product referral
//! purchases.

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    money::{checked_total, percent_of, round_money},
    order::{
        CheckoutReceipt, CommissionOutcome, CreateOrderRequest, Order, OrderItem, OrderStatus,
        PaymentMethod, StatusChange, generate_order_number,
    },
    catalog::{Product, ProductStatus},
    referral::{ProductReferralPurchase, ReferralPurchaseStatus},
    transaction::{LedgerEntry, TransactionType},
    wallet::BalanceType,
};
use crate::services::wallet_service;
use crate::store::{LedgerStore, UnitOfWork};

/// Place an order for `buyer_id`.
///
/// # Errors
///
/// - `InvalidRequest`: no or too many items, quantity out of range, buying
///   from oneself, or a total the ledger cannot store
/// - `SellerNotFound`: `seller_id` is not a known user
/// - `ProductUnavailable`: a product is missing, inactive, or sold by someone else
/// - `InsufficientFunds`: wallet payment and the buyer cannot cover the total
///
/// A partner commission the seller cannot cover is not an error; it is
/// reported as [`CommissionOutcome::SkippedInsufficientFunds`].
pub async fn create_order<S: LedgerStore>(
    store: &S,
    buyer_id: Uuid,
    request: CreateOrderRequest,
) -> Result<CheckoutReceipt, AppError> {
    validate_request(buyer_id, &request)?;
    let now = Utc::now();
    let mut uow = store.begin().await?;

    let seller = uow
        .get_user(request.seller_id)
        .await?
        .ok_or(AppError::SellerNotFound)?;

    // Steps 1-2: validate and price
    let mut items = Vec::with_capacity(request.items.len());
    let mut products = Vec::with_capacity(request.items.len());
    let mut partner_percent = Decimal::ZERO;
    for line in &request.items {
        let product = uow
            .get_product(line.product_id)
            .await?
            .filter(|p| p.seller_id == seller.id && p.status == ProductStatus::Active)
            .ok_or(AppError::ProductUnavailable(line.product_id))?;

        partner_percent = partner_percent.max(product.partner_percent);
        items.push(OrderItem {
            product_id: product.id,
            quantity: line.quantity,
            unit_price: product.price,
            discount_price: product.discount_price,
            product_referrer_id: line.product_referrer_id,
        });
        products.push(product);
    }
    let mut total_amount = Decimal::ZERO;
    for item in &items {
        total_amount = checked_total(total_amount, item.line_total()?)?;
    }
    let total_amount = round_money(total_amount);

    // Step 3: order-level partner program
    let mut referrer_id = None;
    let mut referral_commission = None;
    let code = request
        .referral_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    if let Some(code) = code {
        if partner_percent > Decimal::ZERO && seller.has_active_business(now) {
            let referrer = uow.find_user_by_referral_code(code).await?;
            let commission = percent_of(total_amount, partner_percent)?;
            match referrer {
                Some(referrer) if referrer.id != seller.id && commission > Decimal::ZERO => {
                    referrer_id = Some(referrer.id);
                    referral_commission = Some(commission);
                }
                _ => tracing::debug!(code, "referral code does not earn a commission"),
            }
        }
    }

    // Step 4: the order itself
    let order = Order {
        id: Uuid::new_v4(),
        order_number: generate_order_number(now),
        buyer_id,
        seller_id: seller.id,
        items,
        total_amount,
        payment_method: request.payment_method,
        status: request.payment_method.initial_status(),
        referral_id: referrer_id,
        referral_commission,
        created_at: now,
        updated_at: now,
    };

    let pays_by_wallet =
        order.payment_method == PaymentMethod::Wallet && total_amount > Decimal::ZERO;
    let mut wallets = vec![seller.id];
    if pays_by_wallet {
        wallets.push(buyer_id);
    }
    wallets.extend(referrer_id);
    wallet_service::lock_wallets(&mut uow, &wallets).await?;

    uow.insert_order(&order).await?;

    // Step 5: buyer pays, seller receives 100%
    if pays_by_wallet {
        wallet_service::debit(
            &mut uow,
            buyer_id,
            total_amount,
            BalanceType::Main,
            LedgerEntry::new(
                TransactionType::OrderPayment,
                format!("Payment for order {}", order.order_number),
            )
            .with_reference(order.id),
        )
        .await?;
        wallet_service::credit(
            &mut uow,
            seller.id,
            total_amount,
            BalanceType::Main,
            LedgerEntry::new(
                TransactionType::OrderReceived,
                format!("Sale of order {}", order.order_number),
            )
            .with_reference(order.id),
        )
        .await?;
    }

    // Step 6: partner commission
    let commission = match (referrer_id, referral_commission) {
        (Some(referrer_id), Some(amount)) => {
            settle_partner_commission(&mut uow, &order, referrer_id, amount).await?
        }
        _ => CommissionOutcome::NotApplicable,
    };

    // Step 7: product referral links
    let product_referrals = record_product_referrals(&mut uow, &order, &products, now).await?;

    uow.commit().await?;

    tracing::info!(
        order_number = %order.order_number,
        total = %order.total_amount,
        payment_method = ?order.payment_method,
        ?commission,
        product_referrals,
        "order created"
    );

    Ok(CheckoutReceipt {
        order,
        commission,
        product_referrals,
    })
}

/// Most lines one order may have.
pub const MAX_ORDER_ITEMS: usize = 100;

/// Largest quantity of a single line.
pub const MAX_ITEM_QUANTITY: i32 = 10_000;

fn validate_request(buyer_id: Uuid, request: &CreateOrderRequest) -> Result<(), AppError> {
    if request.items.is_empty() {
        return Err(AppError::InvalidRequest(
            "Order must contain at least one item".to_string(),
        ));
    }
    if request.items.len() > MAX_ORDER_ITEMS {
        return Err(AppError::InvalidRequest(format!(
            "Order must not contain more than {MAX_ORDER_ITEMS} items"
        )));
    }
    if request
        .items
        .iter()
        .any(|i| !(1..=MAX_ITEM_QUANTITY).contains(&i.quantity))
    {
        return Err(AppError::InvalidRequest(format!(
            "Quantity must be between 1 and {MAX_ITEM_QUANTITY}"
        )));
    }
    if request.seller_id == buyer_id {
        return Err(AppError::InvalidRequest(
            "Cannot buy your own products".to_string(),
        ));
    }
    Ok(())
}

/// Charge the partner commission to the seller and pay it to the referrer.
///
/// If the seller's main balance cannot cover the commission, nothing is
/// charged and the order stands.
pub async fn settle_partner_commission<U: UnitOfWork>(
    uow: &mut U,
    order: &Order,
    referrer_id: Uuid,
    amount: Decimal,
) -> Result<CommissionOutcome, AppError> {
    let charged = wallet_service::debit(
        uow,
        order.seller_id,
        amount,
        BalanceType::Main,
        LedgerEntry::new(
            TransactionType::PartnerCommissionPayment,
            format!("Partner commission for order {}", order.order_number),
        )
        .with_reference(order.id),
    )
    .await;

    match charged {
        Ok(_) => {}
        Err(AppError::InsufficientFunds) => {
            tracing::warn!(
                order_number = %order.order_number,
                seller_id = %order.seller_id,
                %amount,
                "seller cannot cover partner commission, skipping"
            );
            return Ok(CommissionOutcome::SkippedInsufficientFunds {
                referrer_id,
                amount,
            });
        }
        Err(e) => return Err(e),
    }

    wallet_service::credit(
        uow,
        referrer_id,
        amount,
        BalanceType::Referral,
        LedgerEntry::new(
            TransactionType::ReferralCommission,
            format!("Partner commission from order {}", order.order_number),
        )
        .with_reference(order.id),
    )
    .await?;

    Ok(CommissionOutcome::Paid {
        referrer_id,
        amount,
    })
}

/// Insert a pending purchase for every item bought through a product
/// referral link whose product runs its own referral program.
async fn record_product_referrals<U: UnitOfWork>(
    uow: &mut U,
    order: &Order,
    products: &[Product],
    now: chrono::DateTime<Utc>,
) -> Result<usize, AppError> {
    let mut recorded = 0;
    for (item, product) in order.items.iter().zip(products) {
        let Some(referrer_id) = item.product_referrer_id else {
            continue;
        };
        if !product.is_referral_enabled || referrer_id == order.buyer_id {
            continue;
        }
        let commission_amount =
            percent_of(item.line_total()?, product.referral_commission_percent)?;
        if commission_amount <= Decimal::ZERO {
            continue;
        }

        let purchase = ProductReferralPurchase {
            id: Uuid::new_v4(),
            referrer_id,
            buyer_id: order.buyer_id,
            product_id: product.id,
            order_id: order.id,
            commission_percent: product.referral_commission_percent,
            commission_amount,
            status: ReferralPurchaseStatus::Pending,
            created_at: now,
            completed_at: None,
        };
        uow.insert_product_referral_purchase(&purchase).await?;
        recorded += 1;
    }
    Ok(recorded)
}

/// Move an order to `new_status` on behalf of `actor_id`.
///
/// Only the order's seller may change its status. Reaching `completed`
/// pays out every pending product referral purchase of the order; asking
/// for `completed` again is accepted and pays nothing twice.
///
/// # Errors
///
/// - `NotFound`: unknown order
/// - `Forbidden`: `actor_id` is not the seller
/// - `InvalidTransition`: the state machine forbids the change
pub async fn update_order_status<S: LedgerStore>(
    store: &S,
    order_id: Uuid,
    new_status: OrderStatus,
    actor_id: Uuid,
) -> Result<Order, AppError> {
    let now = Utc::now();
    let mut uow = store.begin().await?;

    let mut order = uow
        .order_for_update(order_id)
        .await?
        .ok_or(AppError::NotFound("order"))?;

    if order.seller_id != actor_id {
        return Err(AppError::Forbidden);
    }

    if order.status.transition(new_status)? == StatusChange::Apply {
        uow.set_order_status(order_id, new_status, now).await?;
        order.status = new_status;
        order.updated_at = now;
    }

    let settled = if new_status == OrderStatus::Completed {
        settle_product_referrals(&mut uow, &order).await?
    } else {
        0
    };

    uow.commit().await?;

    tracing::info!(
        order_number = %order.order_number,
        status = %order.status,
        settled,
        "order status updated"
    );
    Ok(order)
}

/// Pay every pending product referral purchase of a completed order.
/// Returns how many were paid.
pub async fn settle_product_referrals<U: UnitOfWork>(
    uow: &mut U,
    order: &Order,
) -> Result<usize, AppError> {
    let pending = uow.pending_product_referral_purchases(order.id).await?;
    if pending.is_empty() {
        return Ok(0);
    }

    let referrers: Vec<Uuid> = pending.iter().map(|p| p.referrer_id).collect();
    wallet_service::lock_wallets(uow, &referrers).await?;

    let now = Utc::now();
    for purchase in &pending {
        wallet_service::credit(
            uow,
            purchase.referrer_id,
            purchase.commission_amount,
            BalanceType::Referral,
            LedgerEntry::new(
                TransactionType::ReferralCommission,
                format!("Referral sale in order {}", order.order_number),
            )
            .with_reference(order.id),
        )
        .await?;
        uow.complete_product_referral_purchase(purchase.id, now)
            .await?;
    }

    Ok(pending.len())
}

/// Fetch an order visible to `actor_id` (its buyer or seller).
pub async fn get_order<S: LedgerStore>(
    store: &S,
    order_id: Uuid,
    actor_id: Uuid,
) -> Result<Order, AppError> {
    let order = store
        .find_order(order_id)
        .await?
        .ok_or(AppError::NotFound("order"))?;

    if order.buyer_id != actor_id && order.seller_id != actor_id {
        return Err(AppError::Forbidden);
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        catalog::UserProfile, order::OrderItemRequest, tariff::Tariff,
    };
    use crate::services::wallet_service::{get_wallet, topup};
    use crate::store::MemoryStore;
    use chrono::Duration;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    struct Market {
        store: MemoryStore,
        buyer: Uuid,
        seller: Uuid,
        referrer: Uuid,
    }

    fn market() -> Market {
        let store = MemoryStore::default();
        let buyer = UserProfile::new(Uuid::new_v4());
        let mut seller = UserProfile::new(Uuid::new_v4());
        seller.tariff = Tariff::Business;
        seller.tariff_expires_at = Some(Utc::now() + Duration::days(10));
        let mut referrer = UserProfile::new(Uuid::new_v4());
        referrer.referral_id = Some("ANNA42".to_string());

        let m = Market {
            store,
            buyer: buyer.id,
            seller: seller.id,
            referrer: referrer.id,
        };
        m.store.put_user(buyer);
        m.store.put_user(seller);
        m.store.put_user(referrer);
        m
    }

    fn product(store: &MemoryStore, seller: Uuid, price: &str, partner_percent: &str) -> Uuid {
        let product = Product {
            id: Uuid::new_v4(),
            seller_id: seller,
            status: ProductStatus::Active,
            price: d(price),
            discount_price: None,
            partner_percent: d(partner_percent),
            is_referral_enabled: false,
            referral_commission_percent: Decimal::ZERO,
        };
        let id = product.id;
        store.put_product(product);
        id
    }

    fn request(seller: Uuid, product: Uuid, quantity: i32, code: Option<&str>) -> CreateOrderRequest {
        CreateOrderRequest {
            seller_id: seller,
            items: vec![OrderItemRequest {
                product_id: product,
                quantity,
                product_referrer_id: None,
            }],
            payment_method: PaymentMethod::Wallet,
            referral_code: code.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn wallet_checkout_pays_seller_and_referrer() {
        let m = market();
        let p = product(&m.store, m.seller, "1500.00", "10");
        topup(&m.store, m.buyer, d("5000.00"), None).await.unwrap();

        let receipt = create_order(&m.store, m.buyer, request(m.seller, p, 2, Some("ANNA42")))
            .await
            .unwrap();

        assert_eq!(receipt.order.total_amount, d("3000.00"));
        assert_eq!(receipt.order.status, OrderStatus::Processing);
        assert_eq!(receipt.order.referral_commission, Some(d("300.00")));
        assert_eq!(
            receipt.commission,
            CommissionOutcome::Paid {
                referrer_id: m.referrer,
                amount: d("300.00")
            }
        );

        assert_eq!(get_wallet(&m.store, m.buyer).await.unwrap().main_balance, d("2000.00"));
        assert_eq!(get_wallet(&m.store, m.seller).await.unwrap().main_balance, d("2700.00"));
        let referrer = get_wallet(&m.store, m.referrer).await.unwrap();
        assert_eq!(referrer.referral_balance, d("300.00"));
        assert!(referrer.main_balance.is_zero());
    }

    #[tokio::test]
    async fn commission_needs_active_business_tier() {
        let m = market();
        let mut seller = m.store.user(m.seller).unwrap();
        seller.tariff_expires_at = Some(Utc::now() - Duration::hours(1));
        m.store.put_user(seller);

        let p = product(&m.store, m.seller, "100.00", "10");
        topup(&m.store, m.buyer, d("100.00"), None).await.unwrap();

        let receipt = create_order(&m.store, m.buyer, request(m.seller, p, 1, Some("ANNA42")))
            .await
            .unwrap();

        assert_eq!(receipt.commission, CommissionOutcome::NotApplicable);
        assert_eq!(receipt.order.referral_id, None);
        assert_eq!(get_wallet(&m.store, m.seller).await.unwrap().main_balance, d("100.00"));
        assert!(m.store.transactions_of(m.referrer).is_empty());
    }

    #[tokio::test]
    async fn insufficient_buyer_funds_abort_everything() {
        let m = market();
        let p = product(&m.store, m.seller, "100.00", "10");
        topup(&m.store, m.buyer, d("99.99"), None).await.unwrap();

        let err = create_order(&m.store, m.buyer, request(m.seller, p, 1, Some("ANNA42")))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InsufficientFunds));
        assert_eq!(m.store.order_count(), 0);
        assert_eq!(get_wallet(&m.store, m.buyer).await.unwrap().main_balance, d("99.99"));
        assert!(m.store.transactions_of(m.seller).is_empty());
        assert!(m.store.transactions_of(m.referrer).is_empty());
    }

    #[tokio::test]
    async fn rejects_foreign_and_inactive_products() {
        let m = market();
        let other_seller = Uuid::new_v4();
        m.store.put_user(UserProfile::new(other_seller));
        let foreign = product(&m.store, other_seller, "10.00", "0");
        let inactive = product(&m.store, m.seller, "10.00", "0");
        let mut p = m.store.product(inactive).unwrap();
        p.status = ProductStatus::Moderation;
        m.store.put_product(p);

        for id in [foreign, inactive, Uuid::new_v4()] {
            let err = create_order(&m.store, m.buyer, request(m.seller, id, 1, None))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::ProductUnavailable(pid) if pid == id));
        }

        let err = create_order(&m.store, m.buyer, request(Uuid::new_v4(), foreign, 1, None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SellerNotFound));
    }

    #[tokio::test]
    async fn card_order_with_broke_seller_skips_commission() {
        let m = market();
        let p = product(&m.store, m.seller, "200.00", "25");
        let mut req = request(m.seller, p, 1, Some("ANNA42"));
        req.payment_method = PaymentMethod::Card;

        let receipt = create_order(&m.store, m.buyer, req).await.unwrap();

        assert_eq!(receipt.order.status, OrderStatus::Pending);
        assert_eq!(
            receipt.commission,
            CommissionOutcome::SkippedInsufficientFunds {
                referrer_id: m.referrer,
                amount: d("50.00")
            }
        );
        assert_eq!(m.store.order_count(), 1);
        assert!(m.store.transactions_of(m.referrer).is_empty());
        assert!(m.store.transactions_of(m.seller).is_empty());
    }

    #[tokio::test]
    async fn product_referrals_settle_once_on_completion() {
        let m = market();
        let affiliate = Uuid::new_v4();
        let p = product(&m.store, m.seller, "40.00", "0");
        let mut prod = m.store.product(p).unwrap();
        prod.is_referral_enabled = true;
        prod.referral_commission_percent = d("5");
        m.store.put_product(prod);
        topup(&m.store, m.buyer, d("100.00"), None).await.unwrap();

        let mut req = request(m.seller, p, 2, None);
        req.items[0].product_referrer_id = Some(affiliate);
        let receipt = create_order(&m.store, m.buyer, req).await.unwrap();
        assert_eq!(receipt.product_referrals, 1);

        let order_id = receipt.order.id;
        let purchases = m.store.product_referral_purchases(order_id);
        assert_eq!(purchases[0].status, ReferralPurchaseStatus::Pending);
        assert_eq!(purchases[0].commission_amount, d("4.00"));

        let err = update_order_status(&m.store, order_id, OrderStatus::Completed, m.buyer)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));

        for _ in 0..2 {
            let order = update_order_status(&m.store, order_id, OrderStatus::Completed, m.seller)
                .await
                .unwrap();
            assert_eq!(order.status, OrderStatus::Completed);
        }

        assert_eq!(
            get_wallet(&m.store, affiliate).await.unwrap().referral_balance,
            d("4.00")
        );
        assert_eq!(m.store.transactions_of(affiliate).len(), 1);
        assert_eq!(
            m.store.product_referral_purchases(order_id)[0].status,
            ReferralPurchaseStatus::Completed
        );

        let err = update_order_status(&m.store, order_id, OrderStatus::Cancelled, m.seller)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn orders_are_visible_to_their_parties_only() {
        let m = market();
        let p = product(&m.store, m.seller, "1.00", "0");
        let mut req = request(m.seller, p, 1, None);
        req.payment_method = PaymentMethod::Cash;
        let order = create_order(&m.store, m.buyer, req).await.unwrap().order;

        assert_eq!(get_order(&m.store, order.id, m.buyer).await.unwrap().id, order.id);
        assert_eq!(get_order(&m.store, order.id, m.seller).await.unwrap().items.len(), 1);
        assert!(matches!(
            get_order(&m.store, order.id, m.referrer).await,
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            get_order(&m.store, Uuid::new_v4(), m.buyer).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rejects_malformed_requests() {
        let m = market();
        let p = product(&m.store, m.seller, "1.00", "0");

        let err = create_order(&m.store, m.buyer, request(m.seller, p, 0, None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));

        let err = create_order(&m.store, m.seller, request(m.seller, p, 1, None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn enforces_order_size_limits() {
        let m = market();
        let p = product(&m.store, m.seller, "1.00", "0");

        let err = create_order(
            &m.store,
            m.buyer,
            request(m.seller, p, MAX_ITEM_QUANTITY + 1, None),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));

        let mut req = request(m.seller, p, 1, None);
        req.items = vec![req.items[0].clone(); MAX_ORDER_ITEMS + 1];
        let err = create_order(&m.store, m.buyer, req).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));

        assert_eq!(m.store.order_count(), 0);
    }

    #[tokio::test]
    async fn totals_beyond_the_money_ceiling_are_rejected() {
        let m = market();
        let p = product(&m.store, m.seller, "99999999999999999.99", "10");
        topup(&m.store, m.buyer, d("100.00"), None).await.unwrap();

        // Every line far past the ceiling
        let mut req = request(m.seller, p, MAX_ITEM_QUANTITY, Some("ANNA42"));
        req.items = vec![req.items[0].clone(); MAX_ORDER_ITEMS];
        req.payment_method = PaymentMethod::Card;
        let err = create_order(&m.store, m.buyer, req).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));

        // Each line fits, their sum does not
        let mut req = request(m.seller, p, 10, None);
        req.items = vec![req.items[0].clone(); 2];
        req.payment_method = PaymentMethod::Card;
        let err = create_order(&m.store, m.buyer, req).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));

        assert_eq!(m.store.order_count(), 0);
        assert_eq!(m.store.transactions_of(m.buyer).len(), 1);
        assert!(m.store.transactions_of(m.seller).is_empty());
        assert!(m.store.transactions_of(m.referrer).is_empty());
    }

    #[tokio::test]
    async fn cancelling_moves_no_money() {
        let m = market();
        let affiliate = Uuid::new_v4();
        let p = product(&m.store, m.seller, "40.00", "0");
        let mut prod = m.store.product(p).unwrap();
        prod.is_referral_enabled = true;
        prod.referral_commission_percent = d("5");
        m.store.put_product(prod);
        topup(&m.store, m.buyer, d("100.00"), None).await.unwrap();

        let mut wallet_req = request(m.seller, p, 1, None);
        wallet_req.items[0].product_referrer_id = Some(affiliate);
        let processing = create_order(&m.store, m.buyer, wallet_req).await.unwrap().order;
        assert_eq!(processing.status, OrderStatus::Processing);

        let mut card_req = request(m.seller, p, 1, None);
        card_req.items[0].product_referrer_id = Some(affiliate);
        card_req.payment_method = PaymentMethod::Card;
        let pending = create_order(&m.store, m.buyer, card_req).await.unwrap().order;
        assert_eq!(pending.status, OrderStatus::Pending);

        let parties = [m.buyer, m.seller, affiliate];
        let mut wallets_before = Vec::new();
        for user in parties {
            wallets_before.push(get_wallet(&m.store, user).await.unwrap());
        }
        let txs_before: Vec<usize> = parties
            .iter()
            .map(|&u| m.store.transactions_of(u).len())
            .collect();

        for order in [&processing, &pending] {
            let cancelled = update_order_status(&m.store, order.id, OrderStatus::Cancelled, m.seller)
                .await
                .unwrap();
            assert_eq!(cancelled.status, OrderStatus::Cancelled);
        }

        for (user, before) in parties.iter().zip(&wallets_before) {
            let after = get_wallet(&m.store, *user).await.unwrap();
            assert_eq!(after.main_balance, before.main_balance);
            assert_eq!(after.referral_balance, before.referral_balance);
        }
        let txs_after: Vec<usize> = parties
            .iter()
            .map(|&u| m.store.transactions_of(u).len())
            .collect();
        assert_eq!(txs_after, txs_before);

        for order in [&processing, &pending] {
            let purchases = m.store.product_referral_purchases(order.id);
            assert_eq!(purchases.len(), 1);
            assert_eq!(purchases[0].status, ReferralPurchaseStatus::Pending);

            let err = update_order_status(&m.store, order.id, OrderStatus::Completed, m.seller)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::InvalidTransition { .. }));
        }
        assert!(m.store.transactions_of(affiliate).is_empty());
    }
}
