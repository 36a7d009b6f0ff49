//! Application configuration management.
//!
//! Configuration is read from environment variables (optionally seeded from a
//! `.env` file) and deserialized with `envy` into a type-safe struct.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::models::tariff::TariffPrices;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `DATABASE_MAX_CONNECTIONS` (optional): pool size, defaults to 5
/// - `DEFAULT_CURRENCY` (optional): currency of newly created wallets, defaults to "USD"
/// - `MIN_WITHDRAWAL` (optional): smallest withdrawable amount, defaults to "100.00"
/// - `PRO_MONTHLY_PRICE` / `BUSINESS_MONTHLY_PRICE` (optional): tariff prices
/// - `BILLING_INTERVAL_SECS` (optional): tariff billing sweep period, defaults to 3600
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_currency")]
    pub default_currency: String,

    #[serde(
        default = "default_min_withdrawal",
        with = "rust_decimal::serde::str"
    )]
    pub min_withdrawal: Decimal,

    #[serde(default = "default_pro_price", with = "rust_decimal::serde::str")]
    pub pro_monthly_price: Decimal,

    #[serde(default = "default_business_price", with = "rust_decimal::serde::str")]
    pub business_monthly_price: Decimal,

    #[serde(default = "default_billing_interval")]
    pub billing_interval_secs: u64,
}

fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_min_withdrawal() -> Decimal {
    Decimal::new(10000, 2)
}

fn default_pro_price() -> Decimal {
    Decimal::new(99000, 2)
}

fn default_business_price() -> Decimal {
    Decimal::new(299000, 2)
}

fn default_billing_interval() -> u64 {
    3600
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is missing or a value cannot be
    /// parsed into its expected type.
    pub fn from_env() -> Result<Self, envy::Error> {
        // Does nothing if there is no .env file
        dotenvy::dotenv().ok();

        envy::from_env::<Config>()
    }

    pub fn tariff_prices(&self) -> TariffPrices {
        TariffPrices {
            pro: self.pro_monthly_price,
            business: self.business_monthly_price,
        }
    }
}
