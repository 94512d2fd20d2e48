//! Payment processor integrations.
//!
//! Two processors with different protocol shapes sit behind two traits so
//! that checkout flows (and tests) depend on the contract, not the HTTP API:
//!
//! - [`IntentProcessor`]: an intent is created up front and the buyer's
//!   client confirms it; the outcome arrives by webhook.
//! - [`HostedCheckoutProcessor`]: the buyer is redirected to a hosted page;
//!   this service captures the order explicitly afterwards.
//!
//! In both cases the local order id is the correlation id carried by the
//! processor object.

pub mod card_intents;
pub mod hosted_orders;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::AppError;

/// Errors returned by processor clients.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The processor answered with a non-success status.
    #[error("processor returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The processor's response did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl From<ProcessorError> for AppError {
    fn from(err: ProcessorError) -> Self {
        AppError::Upstream(err.to_string())
    }
}

/// Lifecycle state of a payment intent as reported by the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
}

/// A payment intent as returned by the processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub status: IntentStatus,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Set when the most recent payment attempt failed.
    #[serde(default)]
    pub last_payment_error: Option<serde_json::Value>,
}

impl PaymentIntent {
    /// Correlation id: the local order id stored in the intent's metadata.
    pub fn order_id(&self) -> Option<Uuid> {
        self.metadata
            .get("order_id")
            .and_then(|id| Uuid::parse_str(id).ok())
    }
}

/// Contract for the intent-style processor.
#[async_trait]
pub trait IntentProcessor: Send + Sync {
    /// Create an intent for `amount_cents` in `currency`, correlated to `order_id`.
    async fn create_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        order_id: Uuid,
    ) -> Result<PaymentIntent, ProcessorError>;

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, ProcessorError>;

    async fn cancel_intent(&self, intent_id: &str) -> Result<(), ProcessorError>;
}

/// A hosted checkout order the buyer is redirected to.
#[derive(Debug, Clone)]
pub struct HostedOrder {
    pub id: String,
    pub approve_url: String,
}

/// Outcome of capturing a hosted order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    Completed,
    Declined,
    /// Capture accepted but not final (e.g. under review).
    Pending,
}

#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub processor_order_id: String,
    /// Correlation id echoed back by the processor.
    pub reference: Option<String>,
    pub status: CaptureStatus,
}

/// Contract for the hosted-redirect processor.
#[async_trait]
pub trait HostedCheckoutProcessor: Send + Sync {
    async fn create_order(
        &self,
        amount_cents: i64,
        currency: &str,
        reference: Uuid,
        return_url: &str,
        cancel_url: &str,
    ) -> Result<HostedOrder, ProcessorError>;

    /// Capture an approved order. Idempotent per processor order id:
    /// capturing an already-captured order returns its existing result.
    async fn capture_order(&self, processor_order_id: &str)
    -> Result<CaptureResult, ProcessorError>;
}

/// Currencies without a minor unit.
const ZERO_DECIMAL_CURRENCIES: &[&str] = &["JPY", "KRW", "VND", "CLP", "ISK", "HUF", "TWD"];

/// Format a minor-unit amount as a decimal string for APIs that want one.
///
/// `1234 USD` becomes `"12.34"`; `1234 JPY` stays `"1234"`.
pub fn format_minor_units(amount_cents: i64, currency: &str) -> String {
    if ZERO_DECIMAL_CURRENCIES.contains(&currency.to_ascii_uppercase().as_str()) {
        return amount_cents.to_string();
    }
    let sign = if amount_cents < 0 { "-" } else { "" };
    let abs = amount_cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}
