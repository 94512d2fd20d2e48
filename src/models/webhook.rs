//! Inbound processor webhook payloads.
//!
//! Only the fields the order state machine acts on are modeled; everything
//! else in the processor's envelope is ignored. Payloads are parsed only
//! after the signature over the raw body has been verified.
//!
//! # Card intent events
//!
//! ```json
//! {
//!   "id": "evt_1",
//!   "type": "payment_intent.succeeded",
//!   "data": { "object": { "id": "pi_1", "status": "succeeded", "metadata": { "order_id": "…" }, … } }
//! }
//! ```
//!
//! # Hosted order events
//!
//! ```json
//! {
//!   "id": "WH-1",
//!   "event_type": "CHECKOUT.ORDER.APPROVED",
//!   "resource": { "id": "5O190127TN364715T", … }
//! }
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{models::order::OrderStatus, services::processors::PaymentIntent};

pub const INTENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const INTENT_PAYMENT_FAILED: &str = "payment_intent.payment_failed";
pub const INTENT_CANCELED: &str = "payment_intent.canceled";

pub const ORDER_APPROVED: &str = "CHECKOUT.ORDER.APPROVED";
pub const CAPTURE_COMPLETED: &str = "PAYMENT.CAPTURE.COMPLETED";
pub const CAPTURE_DENIED: &str = "PAYMENT.CAPTURE.DENIED";
pub const ORDER_VOIDED: &str = "CHECKOUT.ORDER.VOIDED";

/// The event's subject. Left untyped until the event type says it is an intent.
#[derive(Debug, Clone, Deserialize)]
pub struct IntentEventData {
    pub object: serde_json::Value,
}

/// Event delivered by the card intent processor.
#[derive(Debug, Clone, Deserialize)]
pub struct IntentEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: IntentEventData,
}

impl IntentEvent {
    /// Read `data.object` as a payment intent.
    pub fn intent(&self) -> Result<PaymentIntent, serde_json::Error> {
        PaymentIntent::deserialize(&self.data.object)
    }
}

/// The subset of a hosted order event's `resource` we read.
///
/// For order events `id` is the processor order id; for capture events it is
/// the capture id and `custom_id` carries the local order id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostedEventResource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub custom_id: Option<String>,
}

impl HostedEventResource {
    /// Correlation id of a capture event.
    pub fn order_id(&self) -> Option<Uuid> {
        self.custom_id
            .as_deref()
            .and_then(|id| Uuid::parse_str(id.trim()).ok())
    }
}

/// Event delivered by the hosted checkout processor.
#[derive(Debug, Clone, Deserialize)]
pub struct HostedEvent {
    pub id: String,
    pub event_type: String,
    #[serde(default)]
    pub resource: HostedEventResource,
}

/// What handling a webhook did, returned to the processor as the 200 body.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WebhookAck {
    pub received: bool,
    /// `false` when the event type is not one we act on, or the order is unknown
    pub handled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
}

impl WebhookAck {
    pub fn handled(order_id: Uuid, status: OrderStatus) -> Self {
        Self {
            received: true,
            handled: true,
            order_id: Some(order_id),
            status: Some(status),
        }
    }

    pub fn ignored() -> Self {
        Self {
            received: true,
            handled: false,
            order_id: None,
            status: None,
        }
    }
}
