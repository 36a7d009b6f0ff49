//! Marketplace wallet ledger and order settlement engine.
//!
//! Moves money between buyers, sellers and referrers, bills subscription
//! tariffs and processes withdrawal requests. Every balance change is
//! recorded as exactly one immutable [`Transaction`] in the same atomic unit
//! as the balance update.
//!
//! [`Transaction`]: models::transaction::Transaction

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;
