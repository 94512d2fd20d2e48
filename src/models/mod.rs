//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables,
//! plus the request and response bodies built from them.

/// Check-in requests, responses and audit log
pub mod check_in;
/// Events and ticket types
pub mod event;
/// Orders and order items
pub mod order;
/// Staff key authentication model
pub mod staff_key;
/// Tickets and guest list entries
pub mod ticket;
/// Inbound processor webhook payloads
pub mod webhook;
