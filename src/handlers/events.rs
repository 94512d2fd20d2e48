//! Catalog HTTP handlers.
//!
//! - GET /api/v1/events/{event_id}/ticket-types - Availability listing

use crate::{
    db::DbPool, error::AppError, models::event::TicketTypeAvailability,
    services::inventory_service,
};
use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use uuid::Uuid;

/// List an event's ticket types with remaining availability.
///
/// # Response (200)
///
/// ```json
/// [
///   { "id": "…", "name": "General", "price_cents": 2500, "currency": "USD", "available": 18, "on_sale": true }
/// ]
/// ```
///
/// Returns 404 if the event does not exist.
pub async fn list_ticket_types(
    State(pool): State<DbPool>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<Vec<TicketTypeAvailability>>, AppError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM events WHERE id = $1)")
        .bind(event_id)
        .fetch_one(&pool)
        .await?;

    if !exists {
        return Err(AppError::not_found(format!("Event {event_id} not found")));
    }

    let now = Utc::now();
    let ticket_types = inventory_service::list_for_event(&pool, event_id)
        .await?
        .into_iter()
        .map(|ticket_type| TicketTypeAvailability::from_ticket_type(ticket_type, now))
        .collect();

    Ok(Json(ticket_types))
}
