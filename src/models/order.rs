//! Order data models and API request/response types.
//!
//! This module defines:
//! - `Order` / `OrderItem`: database entities
//! - `OrderStatus`: the order lifecycle (`pending → paid | failed | canceled`)
//! - Request types for both checkout flows
//! - `OrderResponse`: response body returned to clients

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order lifecycle state.
///
/// `Pending` is the only state a transition may leave. `Paid`, `Failed`
/// and `Canceled` are terminal and are never overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Canceled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
            OrderStatus::Canceled => "canceled",
        }
    }
}

/// Which external processor holds the payment for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_processor", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentProcessor {
    /// Intent created up front, confirmed by the buyer client-side.
    CardIntents,
    /// Buyer redirected to a hosted page, captured on return or webhook.
    HostedOrders,
}

/// Represents an order record from the database.
///
/// # Processor Reference
///
/// `processor_ref` is the intent id or hosted order id returned by the
/// payment processor. It is unique across all orders and is how webhooks
/// and return redirects find their way back to the order.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub event_id: Uuid,
    pub buyer_email: String,
    pub buyer_name: Option<String>,

    /// Sum of `quantity * unit_price_cents` over all items
    pub amount_total_cents: i64,

    pub currency: String,
    pub status: OrderStatus,
    pub processor: Option<PaymentProcessor>,
    pub processor_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// A line of an order.
///
/// `unit_price_cents` is a snapshot of the ticket type's price when the
/// order was created; later price edits do not affect it.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub ticket_type_id: Uuid,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

/// One requested line in a checkout request.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderLineRequest {
    pub ticket_type_id: Uuid,
    pub quantity: i32,
}

/// Request body shared by both checkout flows.
///
/// # JSON Example
///
/// ```json
/// {
///   "event_id": "550e8400-e29b-41d4-a716-446655440000",
///   "buyer_email": "ada@example.com",
///   "buyer_name": "Ada",
///   "items": [
///     { "ticket_type_id": "660e8400-e29b-41d4-a716-446655440001", "quantity": 2 }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub event_id: Uuid,
    pub buyer_email: String,
    pub buyer_name: Option<String>,
    pub items: Vec<OrderLineRequest>,
}

/// Response for the card intent checkout.
///
/// The client uses `client_secret` to confirm the payment with the processor.
#[derive(Debug, Serialize)]
pub struct IntentCheckoutResponse {
    pub order_id: Uuid,
    pub client_secret: String,
    pub amount_total_cents: i64,
    pub currency: String,
}

/// Response for the hosted checkout. The client redirects to `approve_url`.
#[derive(Debug, Serialize)]
pub struct HostedCheckoutResponse {
    pub order_id: Uuid,
    pub approve_url: String,
}

/// Response returned for order lookups and payment completions.
///
/// # JSON Example
///
/// ```json
/// {
///   "id": "770e8400-e29b-41d4-a716-446655440002",
///   "event_id": "550e8400-e29b-41d4-a716-446655440000",
///   "status": "paid",
///   "amount_total_cents": 5000,
///   "currency": "USD",
///   "items": [
///     { "ticket_type_id": "660e8400-...", "quantity": 2, "unit_price_cents": 2500 }
///   ],
///   "created_at": "2025-12-21T16:00:00Z",
///   "paid_at": "2025-12-21T16:02:11Z"
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub event_id: Uuid,
    pub status: OrderStatus,
    pub amount_total_cents: i64,
    pub currency: String,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub ticket_type_id: Uuid,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

impl OrderResponse {
    pub fn new(order: Order, items: Vec<OrderItem>) -> Self {
        Self {
            id: order.id,
            event_id: order.event_id,
            status: order.status,
            amount_total_cents: order.amount_total_cents,
            currency: order.currency,
            items: items
                .into_iter()
                .map(|item| OrderItemResponse {
                    ticket_type_id: item.ticket_type_id,
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price_cents,
                })
                .collect(),
            created_at: order.created_at,
            paid_at: order.paid_at,
        }
    }
}
