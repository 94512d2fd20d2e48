//! Reservation reaper - returns inventory held by abandoned orders.
//!
//! A `pending` order older than the TTL is moved to `failed` and its
//! reserved units are released. Each order is processed in its own
//! transaction with the same conditional update every other transition
//! uses, so a sweep racing a late payment confirmation is safe: whichever
//! writer moves the order out of `pending` first wins, and the other does
//! nothing.
//!
//! A sweep holds no lock across orders and can be run concurrently with
//! itself.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::time::Duration as StdDuration;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::order::OrderStatus,
    services::order_service::{self, CloseOutcome},
};

/// Counts from one sweep.
///
/// `scanned` includes orders another writer finalized first, which count
/// toward neither `released` nor `skipped`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReapSummary {
    pub scanned: u64,
    /// Orders failed and their inventory returned
    pub released: u64,
    /// Orders failed with inventory left in place because tickets exist
    pub skipped: u64,
}

/// Longest accepted reservation TTL (one year).
pub const MAX_TTL_MINUTES: i64 = 366 * 24 * 60;

/// Turn a TTL in minutes into a `Duration`, rejecting values outside
/// `1..=MAX_TTL_MINUTES`.
pub fn ttl_from_minutes(minutes: i64) -> Result<Duration, AppError> {
    if !(1..=MAX_TTL_MINUTES).contains(&minutes) {
        return Err(AppError::Validation(format!(
            "ttl_minutes must be between 1 and {MAX_TTL_MINUTES}"
        )));
    }
    Duration::try_minutes(minutes)
        .ok_or_else(|| AppError::Validation("ttl_minutes is out of range".to_string()))
}

/// Fail every `pending` order created more than `ttl` ago.
///
/// # Process
///
/// 1. Select pending orders with `created_at < now - ttl`
/// 2. For each, in its own transaction: conditional `pending → failed`
///    (re-checking the cutoff), then release unless tickets exist
///
/// A database error on one order is logged and the sweep moves on; the
/// order stays pending for the next sweep.
pub async fn sweep(pool: &DbPool, ttl: Duration) -> Result<ReapSummary, AppError> {
    let cutoff = Utc::now()
        .checked_sub_signed(ttl)
        .ok_or_else(|| AppError::Validation("ttl is out of range".to_string()))?;

    let candidates: Vec<Uuid> = sqlx::query_scalar(
        r#"
        SELECT id FROM orders
        WHERE status = 'pending' AND created_at < $1
        ORDER BY created_at
        "#,
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    let mut summary = ReapSummary::default();

    for order_id in candidates {
        summary.scanned += 1;

        match reap_one(pool, order_id, cutoff).await {
            Ok(CloseOutcome::Released { units }) => {
                tracing::info!(%order_id, units, "Reaped stale order");
                summary.released += 1;
            }
            Ok(CloseOutcome::TicketsPresent) => summary.skipped += 1,
            Ok(CloseOutcome::NotPending) => {
                tracing::debug!(%order_id, "Order finalized by another writer before reaping");
            }
            Err(e) => {
                tracing::error!(%order_id, error = %e, "Failed to reap order");
            }
        }
    }

    tracing::info!(
        scanned = summary.scanned,
        released = summary.released,
        skipped = summary.skipped,
        "Reaper sweep complete"
    );

    Ok(summary)
}

async fn reap_one(
    pool: &DbPool,
    order_id: Uuid,
    cutoff: chrono::DateTime<Utc>,
) -> Result<CloseOutcome, AppError> {
    let mut tx = pool.begin().await?;

    let outcome =
        order_service::close_unpaid_in_tx(&mut tx, order_id, OrderStatus::Failed, Some(cutoff))
            .await?;

    if outcome == CloseOutcome::NotPending {
        tx.rollback().await?;
    } else {
        tx.commit().await?;
    }

    Ok(outcome)
}

/// Run [`sweep`] every `interval` until the process exits.
pub fn spawn_reaper(
    pool: DbPool,
    ttl: Duration,
    interval: StdDuration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = sweep(&pool, ttl).await {
                tracing::error!(error = %e, "Reaper sweep failed");
            }
        }
    })
}
