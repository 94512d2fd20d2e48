//! Ticket issuance - mints one ticket per purchased unit of a paid order.
//!
//! # At-Most-Once Guarantee
//!
//! Issuance runs inside the same transaction as the `pending → paid`
//! conditional update. That update holds the order row lock, so a second
//! concurrent confirmation blocks until the first commits and then finds
//! the order no longer `pending`. The existing-ticket count below is a
//! second guard for replays that reach issuance some other way.

use crate::{
    db::DbTx,
    error::AppError,
    models::{
        order::{Order, OrderItem},
        ticket::Ticket,
    },
    services::redemption_token,
};

/// Mint tickets for every item of `order`.
///
/// # Returns
///
/// The newly minted tickets, or an empty list when the order already had
/// tickets (issuance treated as already applied).
pub async fn issue_for_order(tx: &mut DbTx, order: &Order) -> Result<Vec<Ticket>, AppError> {
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE order_id = $1")
        .bind(order.id)
        .fetch_one(&mut **tx)
        .await?;

    if existing > 0 {
        tracing::info!(
            order_id = %order.id,
            existing,
            "Tickets already issued for order, skipping"
        );
        return Ok(Vec::new());
    }

    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = $1 ORDER BY ticket_type_id",
    )
    .bind(order.id)
    .fetch_all(&mut **tx)
    .await?;

    let mut tickets = Vec::new();
    for item in items {
        let tokens: Vec<String> = (0..item.quantity)
            .map(|_| redemption_token::generate_ticket_token())
            .collect();

        let minted = sqlx::query_as::<_, Ticket>(
            r#"
            INSERT INTO tickets (
                order_id,
                ticket_type_id,
                event_id,
                holder_email,
                holder_name,
                token
            )
            SELECT $1::UUID, $2::UUID, $3::UUID, $4::TEXT, $5::TEXT, UNNEST($6::TEXT[])
            RETURNING *
            "#,
        )
        .bind(order.id)
        .bind(item.ticket_type_id)
        .bind(order.event_id)
        .bind(&order.buyer_email)
        .bind(&order.buyer_name)
        .bind(&tokens)
        .fetch_all(&mut **tx)
        .await?;

        tickets.extend(minted);
    }

    tracing::info!(order_id = %order.id, count = tickets.len(), "Tickets issued");

    Ok(tickets)
}
