//! Order service - the order state machine.
//!
//! This service handles:
//! - Order creation with all-or-nothing inventory reservation
//! - Conditional status transitions out of `pending`
//! - Ticket issuance on the paid transition
//! - Inventory release on the failed/canceled transitions
//!
//! # Transition Discipline
//!
//! Every transition is a single conditional update:
//!
//! ```sql
//! UPDATE orders SET status = <target> WHERE id = $1 AND status = 'pending'
//! ```
//!
//! The affected-row count tells the caller whether it won. Losing is not an
//! error: it means another writer (a webhook replay, the browser return, the
//! reaper) already moved the order to a terminal state, and that state is
//! reported back unchanged. Status is never read, decided on, and written
//! as separate steps.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::{DbPool, DbTx},
    error::AppError,
    models::{
        order::{CreateOrderRequest, Order, OrderItem, OrderStatus, PaymentProcessor},
        ticket::Ticket,
    },
    services::{inventory_service, issuance_service},
};

/// Upper bound on units per order line.
pub const MAX_UNITS_PER_LINE: i32 = 50;

/// Whether a transition attempt changed the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// This call moved the order out of `pending`.
    Applied,
    /// The order was already terminal; nothing changed.
    AlreadyFinal(OrderStatus),
}

/// Result of a paid transition.
#[derive(Debug)]
pub struct PaidTransition {
    pub outcome: TransitionOutcome,
    pub order: Order,
    /// Tickets minted by this call. Empty unless `outcome` is `Applied`.
    pub tickets: Vec<Ticket>,
}

/// What closing an unpaid order did to inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Order closed and its reserved units returned.
    Released { units: i64 },
    /// Order closed but tickets exist, so inventory was left alone.
    TicketsPresent,
    /// Order was no longer pending (or not yet old enough); nothing changed.
    NotPending,
}

/// Result of a failed or canceled transition.
#[derive(Debug)]
pub struct CloseTransition {
    pub outcome: TransitionOutcome,
    pub order: Order,
    pub inventory: CloseOutcome,
}

/// Validate request shape and merge duplicate lines.
///
/// Returns `(ticket_type_id, quantity)` pairs sorted by ticket type id.
fn normalize_request(request: &CreateOrderRequest) -> Result<Vec<(Uuid, i32)>, AppError> {
    let email = request.buyer_email.trim();
    let plausible = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !plausible || email.len() > 254 {
        return Err(AppError::Validation(
            "buyer_email must be a valid email address".to_string(),
        ));
    }

    if request.items.is_empty() {
        return Err(AppError::Validation(
            "Order must contain at least one item".to_string(),
        ));
    }

    let mut lines: BTreeMap<Uuid, i32> = BTreeMap::new();
    for item in &request.items {
        if item.quantity <= 0 {
            return Err(AppError::Validation(
                "Quantity must be positive".to_string(),
            ));
        }
        let quantity = lines.entry(item.ticket_type_id).or_insert(0);
        *quantity = quantity
            .checked_add(item.quantity)
            .filter(|merged| *merged <= MAX_UNITS_PER_LINE)
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "At most {MAX_UNITS_PER_LINE} tickets of one type per order"
                ))
            })?;
    }

    Ok(lines.into_iter().collect())
}

/// Create a pending order, reserving inventory for every line.
///
/// # Process
///
/// 1. Validate request shape
/// 2. Lock every requested ticket type (ascending id order)
/// 3. Validate event membership, sale state, currency and availability
/// 4. Reserve each line
/// 5. Insert the order (`pending`) and its items with snapshotted prices
///
/// All validation happens before the first mutation. Everything runs in
/// the caller's transaction; if any step fails and the transaction is
/// dropped, no order, item or reservation survives.
///
/// # Errors
///
/// - `Validation`: bad email, empty order, non-positive or excessive quantity
/// - `InvalidTicketType`: ticket type missing or belongs to another event
/// - `TicketTypeInactive`: deactivated or outside its sale window
/// - `CurrencyMismatch`: ticket types priced in different currencies
/// - `InsufficientInventory`: a line exceeds remaining capacity
pub async fn create_order(
    tx: &mut DbTx,
    order_id: Uuid,
    request: &CreateOrderRequest,
) -> Result<Order, AppError> {
    let lines = normalize_request(request)?;
    let ids: Vec<Uuid> = lines.iter().map(|(id, _)| *id).collect();

    let ticket_types = inventory_service::lock_ticket_types(tx, &ids).await?;
    let now = Utc::now();

    let mut currency: Option<&str> = None;
    let mut amount_total_cents = 0i64;
    let mut prices = Vec::with_capacity(lines.len());

    for (ticket_type_id, quantity) in &lines {
        let ticket_type = ticket_types
            .iter()
            .find(|tt| tt.id == *ticket_type_id && tt.event_id == request.event_id)
            .ok_or(AppError::InvalidTicketType(*ticket_type_id))?;

        if !ticket_type.is_on_sale(now) {
            return Err(AppError::TicketTypeInactive(ticket_type.id));
        }

        match currency {
            None => currency = Some(&ticket_type.currency),
            Some(expected) if expected != ticket_type.currency => {
                return Err(AppError::CurrencyMismatch {
                    expected: expected.to_string(),
                    found: ticket_type.currency.clone(),
                });
            }
            Some(_) => {}
        }

        if *quantity > ticket_type.available() {
            return Err(AppError::InsufficientInventory {
                ticket_type_id: ticket_type.id,
                requested: *quantity,
                available: ticket_type.available(),
            });
        }

        amount_total_cents += ticket_type.price_cents * i64::from(*quantity);
        prices.push(ticket_type.price_cents);
    }

    let currency = currency
        .map(str::to_string)
        .ok_or_else(|| AppError::Validation("Order must contain at least one item".to_string()))?;

    for (ticket_type_id, quantity) in &lines {
        inventory_service::reserve(tx, *ticket_type_id, *quantity).await?;
    }

    let order = sqlx::query_as::<_, Order>(
        r#"
        INSERT INTO orders (
            id,
            event_id,
            buyer_email,
            buyer_name,
            amount_total_cents,
            currency,
            status
        )
        VALUES ($1, $2, $3, $4, $5, $6, 'pending')
        RETURNING *
        "#,
    )
    .bind(order_id)
    .bind(request.event_id)
    .bind(request.buyer_email.trim())
    .bind(&request.buyer_name)
    .bind(amount_total_cents)
    .bind(&currency)
    .fetch_one(&mut **tx)
    .await?;

    let quantities: Vec<i32> = lines.iter().map(|(_, quantity)| *quantity).collect();
    sqlx::query(
        r#"
        INSERT INTO order_items (order_id, ticket_type_id, quantity, unit_price_cents)
        SELECT $1::UUID, * FROM UNNEST($2::UUID[], $3::INT[], $4::BIGINT[])
        "#,
    )
    .bind(order_id)
    .bind(&ids)
    .bind(&quantities)
    .bind(&prices)
    .execute(&mut **tx)
    .await?;

    tracing::info!(
        %order_id,
        event_id = %request.event_id,
        amount_total_cents,
        lines = lines.len(),
        "Order created"
    );

    Ok(order)
}

/// Record the processor's reference for an order.
pub async fn set_processor_ref(
    tx: &mut DbTx,
    order_id: Uuid,
    processor: PaymentProcessor,
    processor_ref: &str,
) -> Result<(), AppError> {
    let updated = sqlx::query(
        r#"
        UPDATE orders
        SET processor = $2,
            processor_ref = $3,
            updated_at = NOW()
        WHERE id = $1 AND status = 'pending'
        "#,
    )
    .bind(order_id)
    .bind(processor)
    .bind(processor_ref)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(AppError::not_found(format!("Pending order {order_id} not found")));
    }

    Ok(())
}

/// Transition an order to `paid` and issue its tickets.
///
/// Safe to call any number of times, concurrently: exactly one call wins
/// the conditional update and mints tickets; the rest report
/// `AlreadyFinal(Paid)` with no new tickets.
///
/// # Errors
///
/// - `NotFound`: no order with this id
/// - `Database`: the transaction failed (no partial state is committed)
pub async fn transition_to_paid(pool: &DbPool, order_id: Uuid) -> Result<PaidTransition, AppError> {
    let mut tx = pool.begin().await?;

    let won = sqlx::query_as::<_, Order>(
        r#"
        UPDATE orders
        SET status = 'paid',
            paid_at = NOW(),
            updated_at = NOW()
        WHERE id = $1 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(order_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(order) = won else {
        tx.rollback().await?;
        let order = find_order(pool, order_id).await?;
        match order.status {
            OrderStatus::Paid => {
                tracing::info!(%order_id, "Order already paid, confirmation is a no-op");
            }
            status => {
                tracing::warn!(
                    %order_id,
                    status = status.as_str(),
                    "Payment confirmed for an order that is no longer pending; manual refund required"
                );
            }
        }
        return Ok(PaidTransition {
            outcome: TransitionOutcome::AlreadyFinal(order.status),
            order,
            tickets: Vec::new(),
        });
    };

    let tickets = issuance_service::issue_for_order(&mut tx, &order).await?;

    tx.commit().await?;

    tracing::info!(%order_id, tickets = tickets.len(), "Order paid");

    Ok(PaidTransition {
        outcome: TransitionOutcome::Applied,
        order,
        tickets,
    })
}

/// Transition an order to `failed` (payment declined or expired).
pub async fn transition_to_failed(pool: &DbPool, order_id: Uuid) -> Result<CloseTransition, AppError> {
    close_unpaid(pool, order_id, OrderStatus::Failed).await
}

/// Transition an order to `canceled` (buyer abandoned the payment).
pub async fn transition_to_canceled(
    pool: &DbPool,
    order_id: Uuid,
) -> Result<CloseTransition, AppError> {
    close_unpaid(pool, order_id, OrderStatus::Canceled).await
}

async fn close_unpaid(
    pool: &DbPool,
    order_id: Uuid,
    target: OrderStatus,
) -> Result<CloseTransition, AppError> {
    let mut tx = pool.begin().await?;

    let inventory = close_unpaid_in_tx(&mut tx, order_id, target, None).await?;

    if inventory == CloseOutcome::NotPending {
        tx.rollback().await?;
        let order = find_order(pool, order_id).await?;
        return Ok(CloseTransition {
            outcome: TransitionOutcome::AlreadyFinal(order.status),
            order,
            inventory,
        });
    }

    tx.commit().await?;

    let order = find_order(pool, order_id).await?;
    tracing::info!(
        %order_id,
        status = target.as_str(),
        inventory = ?inventory,
        "Order closed"
    );

    Ok(CloseTransition {
        outcome: TransitionOutcome::Applied,
        order,
        inventory,
    })
}

/// Move a pending order to a terminal unpaid status inside `tx`.
///
/// # Process
///
/// 1. Conditional update `pending → target` (optionally also requiring
///    `created_at < created_before`)
/// 2. If it won and no tickets exist for the order, release every item
/// 3. If tickets exist, leave inventory alone: those units are consumed
///
/// The status update holds the order row lock for the rest of `tx`, so a
/// concurrent paid transition cannot issue tickets between steps 1 and 2.
pub async fn close_unpaid_in_tx(
    tx: &mut DbTx,
    order_id: Uuid,
    target: OrderStatus,
    created_before: Option<DateTime<Utc>>,
) -> Result<CloseOutcome, AppError> {
    debug_assert!(matches!(target, OrderStatus::Failed | OrderStatus::Canceled));

    let updated = sqlx::query(
        r#"
        UPDATE orders
        SET status = $2,
            updated_at = NOW()
        WHERE id = $1
          AND status = 'pending'
          AND ($3::TIMESTAMPTZ IS NULL OR created_at < $3)
        "#,
    )
    .bind(order_id)
    .bind(target)
    .bind(created_before)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    if updated == 0 {
        return Ok(CloseOutcome::NotPending);
    }

    let tickets: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE order_id = $1")
        .bind(order_id)
        .fetch_one(&mut **tx)
        .await?;

    if tickets > 0 {
        tracing::warn!(
            %order_id,
            tickets,
            "Closing pending order that already has tickets; inventory left in place"
        );
        return Ok(CloseOutcome::TicketsPresent);
    }

    let units = inventory_service::release_order_items(tx, order_id).await?;

    Ok(CloseOutcome::Released { units })
}

/// Fetch an order by id.
pub async fn find_order(pool: &DbPool, order_id: Uuid) -> Result<Order, AppError> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Order {order_id} not found")))
}

/// Fetch an order together with its items.
pub async fn get_order_with_items(
    pool: &DbPool,
    order_id: Uuid,
) -> Result<(Order, Vec<OrderItem>), AppError> {
    let order = find_order(pool, order_id).await?;

    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = $1 ORDER BY ticket_type_id",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    Ok((order, items))
}

/// Look up an order by the processor's reference (intent id or hosted order id).
pub async fn find_by_processor_ref(
    pool: &DbPool,
    processor_ref: &str,
) -> Result<Option<Order>, AppError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE processor_ref = $1")
        .bind(processor_ref)
        .fetch_optional(pool)
        .await?;

    Ok(order)
}
