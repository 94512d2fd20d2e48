//! Business logic services.
//!
//! Services sit between handlers and the database. Every invariant that
//! spans rows (inventory counters, order status, ticket usage) is enforced
//! here with transactions, row locks and conditional updates.

pub mod check_in_service;
pub mod checkout_service;
pub mod inventory_service;
pub mod issuance_service;
pub mod notification_service;
pub mod order_service;
pub mod processors;
pub mod reaper_service;
pub mod redemption_token;
pub mod signature;
