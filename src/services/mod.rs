//! Business logic services.
//!
//! Services own the ledger rules and are generic over [`LedgerStore`], so the
//! same code runs against PostgreSQL in production and the in-memory store
//! in tests. Each public operation opens one unit of work and commits it
//! before returning.
//!
//! [`LedgerStore`]: crate::store::LedgerStore

pub mod billing_service;
pub mod order_service;
pub mod referral_service;
pub mod wallet_service;
pub mod withdrawal_service;
