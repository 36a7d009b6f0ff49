//! Read models of the collaborators the ledger consults: the product catalog
//! and the user/profile store.
//!
//! The ledger never creates these rows. It only reads them, and the tariff
//! billing job updates the subscription columns of `users` and the referral
//! columns of `products`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::tariff::Tariff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Active,
    Inactive,
    Moderation,
    Blocked,
}

/// Product as seen by checkout.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub status: ProductStatus,

    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,

    #[serde(with = "rust_decimal::serde::str_option")]
    pub discount_price: Option<Decimal>,

    /// Order-level partner program percentage (Business sellers only)
    #[serde(with = "rust_decimal::serde::str")]
    pub partner_percent: Decimal,

    /// Product-level referral link program
    pub is_referral_enabled: bool,

    #[serde(with = "rust_decimal::serde::str")]
    pub referral_commission_percent: Decimal,
}

/// User profile fields relevant to the ledger.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub tariff: Tariff,
    pub tariff_expires_at: Option<DateTime<Utc>>,

    /// User who invited this one
    pub referred_by: Option<Uuid>,

    /// End of the window during which top-ups pay a bonus to `referred_by`
    pub referral_expires_at: Option<DateTime<Utc>>,

    /// Code other users pass at checkout to name this user as referrer
    pub referral_id: Option<String>,
}

impl UserProfile {
    /// A free-tier user without a referrer.
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            tariff: Tariff::Free,
            tariff_expires_at: None,
            referred_by: None,
            referral_expires_at: None,
            referral_id: None,
        }
    }

    pub fn has_active_business(&self, now: DateTime<Utc>) -> bool {
        self.tariff == Tariff::Business && self.tariff_expires_at.is_some_and(|exp| exp > now)
    }

    /// Referrer that should receive a top-up bonus at `now`, if any.
    pub fn active_referrer(&self, now: DateTime<Utc>) -> Option<Uuid> {
        match (self.referred_by, self.referral_expires_at) {
            (Some(referrer), Some(expires)) if expires > now => Some(referrer),
            _ => None,
        }
    }

    pub fn subscription_expired(&self, now: DateTime<Utc>) -> bool {
        self.tariff.is_paid() && self.tariff_expires_at.is_none_or(|exp| exp <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn business_must_be_unexpired() {
        let now = Utc::now();
        let mut user = UserProfile::new(Uuid::new_v4());
        user.tariff = Tariff::Business;
        user.tariff_expires_at = Some(now + Duration::days(3));
        assert!(user.has_active_business(now));

        user.tariff_expires_at = Some(now - Duration::seconds(1));
        assert!(!user.has_active_business(now));
        assert!(user.subscription_expired(now));

        user.tariff = Tariff::Pro;
        user.tariff_expires_at = Some(now + Duration::days(3));
        assert!(!user.has_active_business(now));
        assert!(!user.subscription_expired(now));
    }

    #[test]
    fn referrer_window_is_exclusive_at_expiry() {
        let now = Utc::now();
        let referrer = Uuid::new_v4();
        let mut user = UserProfile::new(Uuid::new_v4());
        user.referred_by = Some(referrer);
        user.referral_expires_at = Some(now);
        assert_eq!(user.active_referrer(now), None);

        user.referral_expires_at = Some(now + Duration::days(1));
        assert_eq!(user.active_referrer(now), Some(referrer));
    }
}
