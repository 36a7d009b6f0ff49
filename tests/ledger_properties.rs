//! End-to-end ledger properties over the in-memory store.
//!
//! Every scenario ends by rebuilding each wallet from its transactions and
//! comparing against the stored balances.

use std::str::FromStr;

use chrono::{Duration, Utc};
use marketplace_ledger::{
    error::AppError,
    models::{
        catalog::{Product, ProductStatus, UserProfile},
        order::{CommissionOutcome, CreateOrderRequest, OrderItemRequest, OrderStatus, PaymentMethod},
        tariff::{Tariff, TariffPrices},
        wallet::BalanceType,
        withdrawal::CreateWithdrawalRequest,
    },
    services::{billing_service, order_service, wallet_service, withdrawal_service},
    store::MemoryStore,
};
use rust_decimal::Decimal;
use uuid::Uuid;

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// Wallet balances must equal the sum of the user's transactions per balance.
async fn assert_ledger_complete(store: &MemoryStore, users: &[Uuid]) {
    for &user in users {
        let wallet = wallet_service::get_wallet(store, user).await.unwrap();
        let txs = store.transactions_of(user);
        let sum = |bt: BalanceType| -> Decimal {
            txs.iter()
                .filter(|t| t.balance_type == bt)
                .map(|t| t.amount)
                .sum()
        };
        assert_eq!(wallet.main_balance, sum(BalanceType::Main), "main of {user}");
        assert_eq!(
            wallet.referral_balance,
            sum(BalanceType::Referral),
            "referral of {user}"
        );
        assert!(wallet.main_balance >= Decimal::ZERO);
        assert!(wallet.referral_balance >= Decimal::ZERO);
    }
}

fn business_seller(store: &MemoryStore) -> Uuid {
    let mut seller = UserProfile::new(Uuid::new_v4());
    seller.tariff = Tariff::Business;
    seller.tariff_expires_at = Some(Utc::now() + Duration::days(20));
    let id = seller.id;
    store.put_user(seller);
    id
}

fn user_with_code(store: &MemoryStore, code: &str) -> Uuid {
    let mut user = UserProfile::new(Uuid::new_v4());
    user.referral_id = Some(code.to_string());
    let id = user.id;
    store.put_user(user);
    id
}

fn listed_product(store: &MemoryStore, seller: Uuid, price: &str, partner: &str) -> Product {
    let product = Product {
        id: Uuid::new_v4(),
        seller_id: seller,
        status: ProductStatus::Active,
        price: d(price),
        discount_price: None,
        partner_percent: d(partner),
        is_referral_enabled: true,
        referral_commission_percent: d("2.5"),
    };
    store.put_product(product.clone());
    product
}

#[tokio::test]
async fn full_marketplace_day_keeps_the_ledger_consistent() {
    let store = MemoryStore::default();
    let seller = business_seller(&store);
    let partner = user_with_code(&store, "PARTNER");
    let affiliate = Uuid::new_v4();

    // The buyer was invited by the partner a week ago
    let mut buyer = UserProfile::new(Uuid::new_v4());
    buyer.referred_by = Some(partner);
    buyer.referral_expires_at = Some(Utc::now() + Duration::days(23));
    let buyer_id = buyer.id;
    store.put_user(buyer);

    let lamp = listed_product(&store, seller, "1200.00", "10");
    let mut chair = listed_product(&store, seller, "900.00", "5");
    chair.discount_price = Some(d("600.00"));
    store.put_product(chair.clone());

    wallet_service::topup(&store, buyer_id, d("5000.00"), None).await.unwrap();
    assert_eq!(
        wallet_service::get_wallet(&store, partner).await.unwrap().referral_balance,
        d("1000.00")
    );

    let receipt = order_service::create_order(
        &store,
        buyer_id,
        CreateOrderRequest {
            seller_id: seller,
            items: vec![
                OrderItemRequest {
                    product_id: lamp.id,
                    quantity: 2,
                    product_referrer_id: None,
                },
                OrderItemRequest {
                    product_id: chair.id,
                    quantity: 1,
                    product_referrer_id: Some(affiliate),
                },
            ],
            payment_method: PaymentMethod::Wallet,
            referral_code: Some("PARTNER".to_string()),
        },
    )
    .await
    .unwrap();

    // 2 × 1200 + 600 = 3000, partner percent is the max of 10 and 5
    assert_eq!(receipt.order.total_amount, d("3000.00"));
    assert_eq!(
        receipt.commission,
        CommissionOutcome::Paid {
            referrer_id: partner,
            amount: d("300.00")
        }
    );
    assert_eq!(receipt.product_referrals, 1);

    order_service::update_order_status(&store, receipt.order.id, OrderStatus::Completed, seller)
        .await
        .unwrap();
    // 2.5% of 600
    assert_eq!(
        wallet_service::get_wallet(&store, affiliate).await.unwrap().referral_balance,
        d("15.00")
    );

    // Partner cashes out part of the earnings and moves the rest to main
    let withdrawal = withdrawal_service::request_withdrawal(
        &store,
        partner,
        CreateWithdrawalRequest {
            amount: d("1000.00"),
            balance_type: BalanceType::Referral,
            method: "bank".to_string(),
            destination: "DE89370400440532013000".to_string(),
        },
        d("100.00"),
    )
    .await
    .unwrap();
    withdrawal_service::approve_withdrawal(&store, withdrawal.id, None)
        .await
        .unwrap();
    wallet_service::transfer_referral_to_main(&store, partner, d("300.00"))
        .await
        .unwrap();

    let partner_wallet = wallet_service::get_wallet(&store, partner).await.unwrap();
    assert!(partner_wallet.referral_balance.is_zero());
    assert_eq!(partner_wallet.main_balance, d("300.00"));
    assert_eq!(
        wallet_service::get_wallet(&store, seller).await.unwrap().main_balance,
        d("2700.00")
    );
    assert_eq!(
        wallet_service::get_wallet(&store, buyer_id).await.unwrap().main_balance,
        d("2000.00")
    );

    assert_ledger_complete(&store, &[buyer_id, seller, partner, affiliate]).await;
}

#[tokio::test]
async fn wallet_checkout_conserves_money_between_parties() {
    let store = MemoryStore::default();
    let seller = business_seller(&store);
    let partner = user_with_code(&store, "P1");
    let buyer = Uuid::new_v4();
    store.put_user(UserProfile::new(buyer));
    let product = listed_product(&store, seller, "333.33", "7");

    wallet_service::topup(&store, buyer, d("1000.00"), None).await.unwrap();
    let before: Decimal = {
        let mut total = Decimal::ZERO;
        for user in [buyer, seller, partner] {
            let w = wallet_service::get_wallet(&store, user).await.unwrap();
            total += w.main_balance + w.referral_balance;
        }
        total
    };

    order_service::create_order(
        &store,
        buyer,
        CreateOrderRequest {
            seller_id: seller,
            items: vec![OrderItemRequest {
                product_id: product.id,
                quantity: 3,
                product_referrer_id: None,
            }],
            payment_method: PaymentMethod::Wallet,
            referral_code: Some("P1".to_string()),
        },
    )
    .await
    .unwrap();

    let mut after = Decimal::ZERO;
    for user in [buyer, seller, partner] {
        let w = wallet_service::get_wallet(&store, user).await.unwrap();
        after += w.main_balance + w.referral_balance;
    }
    assert_eq!(before, after);
    // 7% of 999.99 = 69.9993
    assert_eq!(
        wallet_service::get_wallet(&store, partner).await.unwrap().referral_balance,
        d("70.00")
    );
    assert_ledger_complete(&store, &[buyer, seller, partner]).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checkouts_never_overdraw_the_buyer() {
    let store = MemoryStore::default();
    let seller = business_seller(&store);
    let buyer = Uuid::new_v4();
    store.put_user(UserProfile::new(buyer));
    let product = listed_product(&store, seller, "100.00", "0");
    wallet_service::topup(&store, buyer, d("450.00"), None).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                order_service::create_order(
                    &store,
                    buyer,
                    CreateOrderRequest {
                        seller_id: seller,
                        items: vec![OrderItemRequest {
                            product_id: product.id,
                            quantity: 1,
                            product_referrer_id: None,
                        }],
                        payment_method: PaymentMethod::Wallet,
                        referral_code: None,
                    },
                )
                .await
            })
        })
        .collect();

    let mut placed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            Err(AppError::InsufficientFunds) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(placed, 4);
    assert_eq!(store.order_count(), 4);
    assert_eq!(
        wallet_service::get_wallet(&store, buyer).await.unwrap().main_balance,
        d("50.00")
    );
    assert_ledger_complete(&store, &[buyer, seller]).await;
}

#[tokio::test]
async fn billing_sweep_is_reflected_in_the_ledger() {
    let store = MemoryStore::default();
    let prices = TariffPrices {
        pro: d("990.00"),
        business: d("2990.00"),
    };
    let seller = business_seller(&store);
    wallet_service::topup(&store, seller, d("3000.00"), None).await.unwrap();

    let later = Utc::now() + Duration::days(21);
    let report = billing_service::run_billing_sweep(&store, &prices, later)
        .await
        .unwrap();
    assert_eq!(report.renewed, 1);
    assert_eq!(
        wallet_service::get_wallet(&store, seller).await.unwrap().main_balance,
        d("10.00")
    );

    let much_later = later + Duration::days(31);
    let report = billing_service::run_billing_sweep(&store, &prices, much_later)
        .await
        .unwrap();
    assert_eq!(report.downgraded, 1);
    assert_eq!(store.user(seller).unwrap().tariff, Tariff::Free);

    assert_ledger_complete(&store, &[seller]).await;
}
