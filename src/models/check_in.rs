//! Check-in request/response types and the audit log model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ticket::{GuestListEntry, Ticket};

/// What the operator wants to do with the scanned token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInAction {
    #[default]
    CheckIn,
    Undo,
}

impl CheckInAction {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckInAction::CheckIn => "check_in",
            CheckInAction::Undo => "undo",
        }
    }
}

/// Where the check-in request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInSource {
    Scanner,
    Manual,
    #[default]
    Api,
}

impl CheckInSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckInSource::Scanner => "scanner",
            CheckInSource::Manual => "manual",
            CheckInSource::Api => "api",
        }
    }
}

/// The kind of entity a redemption token resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Ticket,
    Guest,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Ticket => "ticket",
            EntityKind::Guest => "guest",
        }
    }
}

/// Request body for `POST /api/v1/check-in`.
///
/// # JSON Example
///
/// ```json
/// {
///   "token": "tkt_5f1c...",
///   "action": "undo",
///   "reason": "Scanned the wrong wristband",
///   "source": "scanner"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CheckInRequest {
    pub token: String,
    #[serde(default)]
    pub action: CheckInAction,
    pub reason: Option<String>,
    #[serde(default)]
    pub source: CheckInSource,
}

/// Entity-specific success shape.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckInResponse {
    Ticket { action: CheckInAction, ticket: Ticket },
    Guest { action: CheckInAction, guest: GuestListEntry },
}

/// One row of the append-only check-in audit log.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct CheckInAuditEntry {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub actor_id: Uuid,
    pub actor_role: String,
    pub action: String,
    pub reason: Option<String>,
    pub source: String,
    pub created_at: DateTime<Utc>,
}
