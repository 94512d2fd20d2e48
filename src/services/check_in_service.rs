//! Check-in ledger - one-way redemption of tickets and guest passes.
//!
//! This service handles:
//! - Resolving a scanned code to a ticket or guest list entry
//! - Checking in (`issued → checked_in`, or setting a guest's `last_used_at`)
//! - Undoing a ticket check-in (elevated actors only, with a reason)
//! - Writing the audit log for every applied change
//!
//! # Double Entry
//!
//! Every change is a conditional update guarded by the current state. Two
//! simultaneous scans of the same code race on that update: one wins, the
//! other gets `Conflict`. A repeat scan is never a silent success.
//!
//! # Guest Passes
//!
//! Guest redemption has no undo. An undo request for a guest token is
//! rejected as a validation error.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::{AuthContext, Authorizer},
    models::{
        check_in::{CheckInAction, CheckInRequest, CheckInResponse, CheckInSource, EntityKind},
        ticket::{GuestListEntry, Ticket},
    },
    services::redemption_token::{self, TokenKind},
};

/// Minimum undo reason length, after trimming.
pub const MIN_UNDO_REASON_CHARS: usize = 5;

const NOT_FOUND_MESSAGE: &str = "No ticket or guest pass matches this code";

/// A scanned code resolved to its entity.
#[derive(Debug)]
enum Redeemable {
    Ticket(Ticket),
    Guest(GuestListEntry),
}

async fn find_ticket(pool: &DbPool, token: &str) -> Result<Option<Ticket>, AppError> {
    let ticket = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE token = $1")
        .bind(token)
        .fetch_optional(pool)
        .await?;
    Ok(ticket)
}

async fn find_guest(pool: &DbPool, token: &str) -> Result<Option<GuestListEntry>, AppError> {
    let guest =
        sqlx::query_as::<_, GuestListEntry>("SELECT * FROM guest_list_entries WHERE token = $1")
            .bind(token)
            .fetch_optional(pool)
            .await?;
    Ok(guest)
}

/// Look a code up by its prefix; unprefixed codes try tickets, then guests.
async fn resolve(pool: &DbPool, token: &str) -> Result<Redeemable, AppError> {
    let token = token.trim();

    let found = match redemption_token::classify(token) {
        TokenKind::Ticket => find_ticket(pool, token).await?.map(Redeemable::Ticket),
        TokenKind::Guest => find_guest(pool, token).await?.map(Redeemable::Guest),
        TokenKind::Unknown => match find_ticket(pool, token).await? {
            Some(ticket) => Some(Redeemable::Ticket(ticket)),
            None => find_guest(pool, token).await?.map(Redeemable::Guest),
        },
    };

    found.ok_or_else(|| AppError::NotFound {
        message: NOT_FOUND_MESSAGE.to_string(),
        token: Some(token.to_string()),
    })
}

/// Check in a ticket or redeem a guest pass.
///
/// # Errors
///
/// - `Validation`: empty token
/// - `NotFound`: no entity for the token (the token is echoed back)
/// - `Conflict`: already checked in / already used (carries when)
pub async fn check_in(
    pool: &DbPool,
    token: &str,
    actor: &AuthContext,
    source: CheckInSource,
) -> Result<CheckInResponse, AppError> {
    if token.trim().is_empty() {
        return Err(AppError::Validation("token is required".to_string()));
    }

    match resolve(pool, token).await? {
        Redeemable::Ticket(ticket) => {
            let updated = sqlx::query_as::<_, Ticket>(
                r#"
                UPDATE tickets
                SET status = 'checked_in',
                    checked_in_at = NOW()
                WHERE id = $1 AND status = 'issued'
                RETURNING *
                "#,
            )
            .bind(ticket.id)
            .fetch_optional(pool)
            .await?;

            let Some(ticket) = updated else {
                let at = current_check_in_time(pool, ticket.id).await?;
                tracing::info!(ticket_id = %ticket.id, "Ticket already checked in");
                return Err(AppError::Conflict {
                    message: "Ticket already checked in".to_string(),
                    at,
                });
            };

            record_audit(pool, EntityKind::Ticket, ticket.id, actor, CheckInAction::CheckIn, None, source)
                .await;
            tracing::info!(ticket_id = %ticket.id, actor_id = %actor.actor_id, "Ticket checked in");

            Ok(CheckInResponse::Ticket {
                action: CheckInAction::CheckIn,
                ticket,
            })
        }
        Redeemable::Guest(guest) => {
            let updated = sqlx::query_as::<_, GuestListEntry>(
                r#"
                UPDATE guest_list_entries
                SET last_used_at = NOW()
                WHERE id = $1 AND last_used_at IS NULL
                RETURNING *
                "#,
            )
            .bind(guest.id)
            .fetch_optional(pool)
            .await?;

            let Some(guest) = updated else {
                let at = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
                    "SELECT last_used_at FROM guest_list_entries WHERE id = $1",
                )
                .bind(guest.id)
                .fetch_optional(pool)
                .await?
                .flatten();
                tracing::info!(guest_id = %guest.id, "Guest pass already used");
                return Err(AppError::Conflict {
                    message: "Guest pass already used".to_string(),
                    at,
                });
            };

            record_audit(pool, EntityKind::Guest, guest.id, actor, CheckInAction::CheckIn, None, source)
                .await;
            tracing::info!(guest_id = %guest.id, actor_id = %actor.actor_id, "Guest pass redeemed");

            Ok(CheckInResponse::Guest {
                action: CheckInAction::CheckIn,
                guest,
            })
        }
    }
}

async fn current_check_in_time(
    pool: &DbPool,
    ticket_id: Uuid,
) -> Result<Option<DateTime<Utc>>, AppError> {
    let at = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
        "SELECT checked_in_at FROM tickets WHERE id = $1",
    )
    .bind(ticket_id)
    .fetch_optional(pool)
    .await?
    .flatten();
    Ok(at)
}

/// Revert a ticket check-in.
///
/// # Process
///
/// 1. Authorize: the actor must hold an elevated role
/// 2. Validate the reason
/// 3. Resolve the token; guest passes cannot be undone
/// 4. Conditional `checked_in → issued`
/// 5. Audit with the reason
///
/// # Errors
///
/// - `Forbidden`: actor is not elevated (checked before anything else)
/// - `Validation`: reason missing or shorter than five characters, or a guest token
/// - `NotFound`: no entity for the token
/// - `Conflict`: ticket is not checked in
pub async fn undo(
    pool: &DbPool,
    authorizer: &dyn Authorizer,
    token: &str,
    actor: &AuthContext,
    reason: Option<&str>,
    source: CheckInSource,
) -> Result<CheckInResponse, AppError> {
    if !authorizer.is_elevated(actor.actor_id).await? {
        tracing::warn!(actor_id = %actor.actor_id, role = %actor.role, "Undo refused");
        return Err(AppError::Forbidden(
            "Only admins and owners can undo a check-in".to_string(),
        ));
    }

    let reason = reason.map(str::trim).unwrap_or_default();
    if reason.chars().count() < MIN_UNDO_REASON_CHARS {
        return Err(AppError::Validation(format!(
            "A reason of at least {MIN_UNDO_REASON_CHARS} characters is required to undo a check-in"
        )));
    }

    let ticket = match resolve(pool, token).await? {
        Redeemable::Ticket(ticket) => ticket,
        Redeemable::Guest(_) => {
            return Err(AppError::Validation(
                "Guest pass redemption cannot be undone".to_string(),
            ));
        }
    };

    let updated = sqlx::query_as::<_, Ticket>(
        r#"
        UPDATE tickets
        SET status = 'issued',
            checked_in_at = NULL
        WHERE id = $1 AND status = 'checked_in'
        RETURNING *
        "#,
    )
    .bind(ticket.id)
    .fetch_optional(pool)
    .await?;

    let Some(ticket) = updated else {
        return Err(AppError::conflict("Ticket is not checked in"));
    };

    record_audit(
        pool,
        EntityKind::Ticket,
        ticket.id,
        actor,
        CheckInAction::Undo,
        Some(reason),
        source,
    )
    .await;
    tracing::info!(ticket_id = %ticket.id, actor_id = %actor.actor_id, "Check-in undone");

    Ok(CheckInResponse::Ticket {
        action: CheckInAction::Undo,
        ticket,
    })
}

/// Dispatch a check-in request by its action.
pub async fn process(
    pool: &DbPool,
    authorizer: &dyn Authorizer,
    actor: &AuthContext,
    request: &CheckInRequest,
) -> Result<CheckInResponse, AppError> {
    match request.action {
        CheckInAction::CheckIn => check_in(pool, &request.token, actor, request.source).await,
        CheckInAction::Undo => {
            undo(
                pool,
                authorizer,
                &request.token,
                actor,
                request.reason.as_deref(),
                request.source,
            )
            .await
        }
    }
}

/// Append an audit row. Failures are logged, never returned: the state
/// change has already been applied.
async fn record_audit(
    pool: &DbPool,
    kind: EntityKind,
    entity_id: Uuid,
    actor: &AuthContext,
    action: CheckInAction,
    reason: Option<&str>,
    source: CheckInSource,
) {
    let result = sqlx::query(
        r#"
        INSERT INTO check_in_audit (entity_type, entity_id, actor_id, actor_role, action, reason, source)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(kind.as_str())
    .bind(entity_id)
    .bind(actor.actor_id)
    .bind(&actor.role)
    .bind(action.as_str())
    .bind(reason)
    .bind(source.as_str())
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::error!(
            entity_type = kind.as_str(),
            %entity_id,
            action = action.as_str(),
            error = %e,
            "Failed to write check-in audit entry"
        );
    }
}
