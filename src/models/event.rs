//! Event and ticket type models.
//!
//! This module defines:
//! - `Event`: the occasion tickets are sold for
//! - `TicketType`: a purchasable category of admission with its own capacity
//! - `TicketTypeAvailability`: response body for the availability listing

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Represents an event record from the database.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Represents a ticket type record from the database.
///
/// # Inventory Counters
///
/// `quantity_sold` counts units held by pending orders plus units sold to
/// paid orders. A database CHECK constraint keeps it within
/// `0..=quantity_total`; the inventory service only changes it under a row
/// lock or with arithmetic updates inside a transaction.
///
/// # Price Storage
///
/// Prices are stored as `i64` minor currency units (e.g. cents).
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct TicketType {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub price_cents: i64,

    /// Currency code (ISO 4217, 3 letters)
    pub currency: String,

    /// Capacity for this ticket type
    pub quantity_total: i32,

    /// Reserved plus sold units
    pub quantity_sold: i32,

    pub is_active: bool,
    pub sales_start_at: Option<DateTime<Utc>>,
    pub sales_end_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketType {
    /// Remaining capacity that can still be reserved.
    pub fn available(&self) -> i32 {
        (self.quantity_total - self.quantity_sold).max(0)
    }

    /// Whether this ticket type can be purchased at `now`.
    ///
    /// Requires the active flag and, when set, `now` inside the sale window.
    pub fn is_on_sale(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.sales_start_at.is_none_or(|start| now >= start)
            && self.sales_end_at.is_none_or(|end| now < end)
    }
}

/// Response body for the availability listing.
///
/// # JSON Example
///
/// ```json
/// {
///   "id": "550e8400-e29b-41d4-a716-446655440000",
///   "name": "VIP",
///   "price_cents": 12000,
///   "currency": "EUR",
///   "available": 18,
///   "on_sale": true
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct TicketTypeAvailability {
    pub id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub currency: String,
    pub available: i32,
    pub on_sale: bool,
}

impl TicketTypeAvailability {
    pub fn from_ticket_type(ticket_type: TicketType, now: DateTime<Utc>) -> Self {
        Self {
            on_sale: ticket_type.is_on_sale(now),
            available: ticket_type.available(),
            id: ticket_type.id,
            name: ticket_type.name,
            price_cents: ticket_type.price_cents,
            currency: ticket_type.currency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ticket_type(quantity_total: i32, quantity_sold: i32) -> TicketType {
        let now = Utc::now();
        TicketType {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            name: "General".into(),
            price_cents: 2500,
            currency: "USD".into(),
            quantity_total,
            quantity_sold,
            is_active: true,
            sales_start_at: None,
            sales_end_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn available_is_remaining_capacity() {
        assert_eq!(ticket_type(10, 3).available(), 7);
        assert_eq!(ticket_type(5, 5).available(), 0);
    }

    #[test]
    fn sale_window_bounds_purchases() {
        let now = Utc::now();
        let mut tt = ticket_type(10, 0);
        assert!(tt.is_on_sale(now));

        tt.sales_start_at = Some(now + Duration::hours(1));
        assert!(!tt.is_on_sale(now));

        tt.sales_start_at = Some(now - Duration::hours(2));
        tt.sales_end_at = Some(now - Duration::hours(1));
        assert!(!tt.is_on_sale(now));

        tt.sales_end_at = None;
        tt.is_active = false;
        assert!(!tt.is_on_sale(now));
    }
}
