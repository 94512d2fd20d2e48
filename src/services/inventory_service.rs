//! Inventory ledger - reserves and releases ticket type capacity.
//!
//! This service handles:
//! - Row-locked reservation of `quantity_sold`
//! - Guarded release of previously reserved quantities
//! - Availability reads
//!
//! # Atomicity Guarantees
//!
//! Every mutation runs inside the caller's transaction. A reservation takes
//! the ticket type row lock (`SELECT ... FOR UPDATE`) and holds it until the
//! caller commits or rolls back, so two concurrent orders can never both
//! pass the capacity check against the same stale count. The database CHECK
//! constraint on `ticket_types` is the last line: `quantity_sold` can never
//! leave `0..=quantity_total` even if application code is wrong.

use crate::{
    db::{DbPool, DbTx},
    error::AppError,
    models::event::TicketType,
};
use uuid::Uuid;

/// Lock a set of ticket types for the rest of the transaction.
///
/// Rows are locked in ascending id order so that two orders touching the
/// same ticket types in different line order cannot deadlock.
pub async fn lock_ticket_types(
    tx: &mut DbTx,
    ticket_type_ids: &[Uuid],
) -> Result<Vec<TicketType>, AppError> {
    let ticket_types = sqlx::query_as::<_, TicketType>(
        "SELECT * FROM ticket_types WHERE id = ANY($1) ORDER BY id FOR UPDATE",
    )
    .bind(ticket_type_ids)
    .fetch_all(&mut **tx)
    .await?;

    Ok(ticket_types)
}

/// Reserve `quantity` units of a ticket type.
///
/// # Process
///
/// 1. Lock the ticket type row
/// 2. Check `quantity <= quantity_total - quantity_sold`
/// 3. Increment `quantity_sold`
///
/// # Errors
///
/// - `InvalidTicketType`: ticket type doesn't exist
/// - `InsufficientInventory`: not enough remaining capacity (carries what is left)
/// - `Validation`: quantity is zero or negative
pub async fn reserve(tx: &mut DbTx, ticket_type_id: Uuid, quantity: i32) -> Result<(), AppError> {
    if quantity <= 0 {
        return Err(AppError::Validation(
            "Quantity must be positive".to_string(),
        ));
    }

    // FOR UPDATE holds the row until the surrounding transaction ends
    let (quantity_total, quantity_sold): (i32, i32) = sqlx::query_as(
        "SELECT quantity_total, quantity_sold FROM ticket_types WHERE id = $1 FOR UPDATE",
    )
    .bind(ticket_type_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(AppError::InvalidTicketType(ticket_type_id))?;

    let available = quantity_total - quantity_sold;
    if quantity > available {
        return Err(AppError::InsufficientInventory {
            ticket_type_id,
            requested: quantity,
            available: available.max(0),
        });
    }

    sqlx::query(
        r#"
        UPDATE ticket_types
        SET quantity_sold = quantity_sold + $1,
            updated_at = NOW()
        WHERE id = $2
        "#,
    )
    .bind(quantity)
    .bind(ticket_type_id)
    .execute(&mut **tx)
    .await?;

    tracing::debug!(%ticket_type_id, quantity, "Inventory reserved");

    Ok(())
}

/// Release `quantity` previously reserved units of a ticket type.
///
/// Only called for quantities the same order reserved. The update is
/// guarded by `quantity_sold >= quantity`; a guard miss means the counter
/// no longer reflects this order's hold, which is reported instead of
/// driving the counter negative.
pub async fn release(tx: &mut DbTx, ticket_type_id: Uuid, quantity: i32) -> Result<(), AppError> {
    let updated = sqlx::query(
        r#"
        UPDATE ticket_types
        SET quantity_sold = quantity_sold - $1,
            updated_at = NOW()
        WHERE id = $2 AND quantity_sold >= $1
        "#,
    )
    .bind(quantity)
    .bind(ticket_type_id)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    if updated == 0 {
        tracing::error!(
            %ticket_type_id,
            quantity,
            "Release would drive quantity_sold below zero"
        );
        return Err(AppError::conflict(format!(
            "Cannot release {quantity} units of ticket type {ticket_type_id}"
        )));
    }

    tracing::debug!(%ticket_type_id, quantity, "Inventory released");

    Ok(())
}

/// Release every item of an order back to its ticket type.
///
/// Items are released in ticket type id order, matching the lock order used
/// when they were reserved.
pub async fn release_order_items(tx: &mut DbTx, order_id: Uuid) -> Result<i64, AppError> {
    let items: Vec<(Uuid, i32)> = sqlx::query_as(
        "SELECT ticket_type_id, quantity FROM order_items WHERE order_id = $1 ORDER BY ticket_type_id",
    )
    .bind(order_id)
    .fetch_all(&mut **tx)
    .await?;

    let mut released = 0i64;
    for (ticket_type_id, quantity) in items {
        release(tx, ticket_type_id, quantity).await?;
        released += i64::from(quantity);
    }

    Ok(released)
}

/// List ticket types for an event with their current counters.
pub async fn list_for_event(pool: &DbPool, event_id: Uuid) -> Result<Vec<TicketType>, AppError> {
    let ticket_types = sqlx::query_as::<_, TicketType>(
        "SELECT * FROM ticket_types WHERE event_id = $1 ORDER BY price_cents, name",
    )
    .bind(event_id)
    .fetch_all(pool)
    .await?;

    Ok(ticket_types)
}
