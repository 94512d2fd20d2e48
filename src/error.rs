//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use uuid::Uuid;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Validation Errors**: bad input shape, rejected before any mutation
/// - **Business Rule Errors**: inventory, currency and ticket type rules
/// - **State Errors**: the entity has already moved past the requested transition
/// - **Authentication/Authorization Errors**: missing key, bad signature, not elevated
/// - **Upstream Errors**: a payment processor call failed
/// - **Database Errors**: any sqlx::Error from database operations
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    ///
    /// Always surfaced for core mutations, never swallowed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("{0}")]
    Validation(String),

    /// A requested ticket type does not exist or belongs to another event.
    #[error("Ticket type {0} is not valid for this event")]
    InvalidTicketType(Uuid),

    /// A requested ticket type is deactivated or outside its sale window.
    #[error("Ticket type {0} is not on sale")]
    TicketTypeInactive(Uuid),

    /// The requested ticket types are priced in more than one currency.
    #[error("All ticket types in an order must share one currency (found {expected} and {found})")]
    CurrencyMismatch { expected: String, found: String },

    /// Not enough remaining capacity to reserve the requested quantity.
    ///
    /// Returns HTTP 409 Conflict with the shortfall context.
    #[error("Insufficient inventory for ticket type {ticket_type_id}: requested {requested}, available {available}")]
    InsufficientInventory {
        ticket_type_id: Uuid,
        requested: i32,
        available: i32,
    },

    /// Entity or redemption token not found.
    ///
    /// `token` echoes back the submitted redemption token, when there was one.
    #[error("{message}")]
    NotFound {
        message: String,
        token: Option<String>,
    },

    /// The entity has already advanced past the requested transition.
    ///
    /// A terminal outcome for this attempt, not something to retry.
    #[error("{message}")]
    Conflict {
        message: String,
        at: Option<DateTime<Utc>>,
    },

    /// The authenticated actor may not perform this action.
    #[error("{0}")]
    Forbidden(String),

    /// Staff key or shared secret is missing, invalid, or inactive.
    #[error("Invalid credentials")]
    Unauthorized,

    /// Webhook payload signature did not verify.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Caller exceeded the request-rate policy.
    #[error("Too many requests, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// A payment processor call failed. The local transaction has already rolled back.
    #[error("Payment processor error: {0}")]
    Upstream(String),
}

impl AppError {
    /// Shorthand for a `NotFound` without a token to echo back.
    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound {
            message: message.into(),
            token: None,
        }
    }

    /// Shorthand for a `Conflict` without a timestamp.
    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict {
            message: message.into(),
            at: None,
        }
    }

    /// Machine-readable error code used in response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "internal_error",
            AppError::Validation(_) => "validation_error",
            AppError::InvalidTicketType(_) => "invalid_ticket_type",
            AppError::TicketTypeInactive(_) => "ticket_type_inactive",
            AppError::CurrencyMismatch { .. } => "currency_mismatch",
            AppError::InsufficientInventory { .. } => "insufficient_inventory",
            AppError::NotFound { .. } => "not_found",
            AppError::Conflict { .. } => "conflict",
            AppError::Forbidden(_) => "forbidden",
            AppError::Unauthorized => "unauthorized",
            AppError::InvalidSignature => "invalid_signature",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::Upstream(_) => "upstream_error",
        }
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidTicketType(_)
            | AppError::TicketTypeInactive(_)
            | AppError::CurrencyMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InsufficientInventory { .. } | AppError::Conflict { .. } => {
                StatusCode::CONFLICT
            }
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unauthorized | AppError::InvalidSignature => StatusCode::UNAUTHORIZED,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "insufficient_inventory",
///     "message": "Insufficient inventory for ticket type ...",
///     "available": 0
///   }
/// }
/// ```
///
/// Variant-specific context (shortfall, echoed token, retry hint) is merged
/// into the `error` object. Database details are never exposed.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        let message = match &self {
            AppError::Database(e) => {
                tracing::error!(error = ?e, "Database error");
                "An internal error occurred".to_string()
            }
            AppError::Upstream(msg) => {
                tracing::warn!(error = %msg, "Payment processor error");
                self.to_string()
            }
            _ => self.to_string(),
        };

        let mut error = json!({
            "code": code,
            "message": message,
        });

        let context = match &self {
            AppError::InsufficientInventory {
                ticket_type_id,
                requested,
                available,
            } => json!({
                "ticket_type_id": ticket_type_id,
                "requested": requested,
                "available": available,
            }),
            AppError::NotFound {
                token: Some(token), ..
            } => json!({
                "token": token,
                "hint": "Check that the code was scanned completely and belongs to this event",
            }),
            AppError::Conflict { at: Some(at), .. } => json!({ "at": at }),
            AppError::RateLimited { retry_after_secs } => {
                json!({ "retry_after_secs": retry_after_secs })
            }
            _ => Value::Null,
        };

        if let (Value::Object(target), Value::Object(extra)) = (&mut error, context) {
            target.extend(extra);
        }

        let mut response = (status, Json(json!({ "error": error }))).into_response();

        if let AppError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }

        response
    }
}
