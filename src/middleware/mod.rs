//! HTTP middleware components.
//!
//! Middleware are functions that run before route handlers.
//! They can:
//! - Authenticate requests
//! - Short-circuit requests (reject unauthorized or over-limit callers)

/// Staff key authentication and role authorization
pub mod auth;

/// Per-actor fixed-window rate limiting
pub mod rate_limit;
