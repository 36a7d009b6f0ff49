//! Data models representing database entities and API payloads.

/// API key authentication model
pub mod api_key;
/// Products and user profiles read from collaborators
pub mod catalog;
pub mod money;
pub mod order;
pub mod referral;
pub mod tariff;
pub mod transaction;
pub mod wallet;
pub mod withdrawal;
