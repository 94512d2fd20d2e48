//! Staff key model for authentication.
//!
//! Staff keys identify the door staff and organizers who use the check-in
//! endpoint. They are stored in the database as SHA-256 hashes.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Represents a staff key record from the database.
///
/// # Roles
///
/// - `staff`: may check tickets and guests in
/// - `admin` / `owner`: elevated, may also undo a check-in
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StaffKey {
    /// Unique identifier, also used as the actor id in the audit log
    pub id: Uuid,

    /// SHA-256 hash of the actual key (64 hex characters)
    pub key_hash: String,

    pub display_name: String,

    pub role: String,

    pub created_at: DateTime<Utc>,

    /// Inactive keys are rejected during authentication.
    pub is_active: bool,
}
