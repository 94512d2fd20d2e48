//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, raw bytes for webhooks)
//! 2. Delegates to a service
//! 3. Returns HTTP response (JSON, status code)

/// Ticket check-in and undo
pub mod check_in;
/// Ticket type availability
pub mod events;
/// Service health
pub mod health;
/// Checkout and order lookup
pub mod orders;
/// Processor webhooks and hosted return/cancel
pub mod payments;
/// Stale reservation sweep
pub mod reaper;
