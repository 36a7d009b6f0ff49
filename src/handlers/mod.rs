//! HTTP request handlers (route handlers).
//!
//! Handlers stay thin: extract the caller from [`AuthContext`], parse the
//! body, call one service function, and wrap the result in JSON.
//!
//! [`AuthContext`]: crate::middleware::auth::AuthContext

use std::sync::Arc;

use crate::{config::Config, store::PgStore};

pub mod health;
pub mod orders;
pub mod tariffs;
/// Balances, history, transfers and admin top-ups
pub mod wallets;
pub mod withdrawals;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: PgStore,
    pub config: Arc<Config>,
}
