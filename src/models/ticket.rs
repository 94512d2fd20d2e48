//! Ticket and guest list models.
//!
//! A `Ticket` is minted once per purchased unit of a paid order. A
//! `GuestListEntry` is a free pass bound to one event and guest email with
//! no order behind it. Both carry a unique redemption token that is
//! scanned at the venue door.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ticket usage state. Reversible by an elevated actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Issued,
    CheckedIn,
}

/// Represents a ticket record from the database.
///
/// `order_id` and `ticket_type_id` may be nulled when the order or ticket
/// type is deleted; the ticket itself stays valid.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Ticket {
    pub id: Uuid,
    pub order_id: Option<Uuid>,
    pub ticket_type_id: Option<Uuid>,
    pub event_id: Uuid,
    pub holder_email: String,
    pub holder_name: Option<String>,

    /// Redemption token encoded in the ticket's QR code
    #[serde(skip_serializing)]
    pub token: String,

    pub status: TicketStatus,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Represents a guest list entry record from the database.
///
/// Redemption is one-way: `last_used_at` is set once and never cleared.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct GuestListEntry {
    pub id: Uuid,
    pub event_id: Uuid,
    pub guest_email: String,
    pub guest_name: Option<String>,

    #[serde(skip_serializing)]
    pub token: String,

    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
