//! Staff key authentication middleware and role authorization.
//!
//! This middleware intercepts every staff request to:
//! 1. Extract the staff key from the Authorization header
//! 2. Hash it and verify it exists in the database
//! 3. Inject the current actor into the request
//! 4. Reject unauthorized requests with HTTP 401
//!
//! Role checks are separate: [`Authorizer`] answers whether an actor is
//! elevated, and is passed explicitly into the services that need it.

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{db::DbPool, error::AppError, models::staff_key::StaffKey};

/// Roles allowed to undo a check-in.
pub const ELEVATED_ROLES: &[&str] = &["admin", "owner"];

/// The current actor, attached to authenticated requests.
///
/// Handlers extract it with `Extension<AuthContext>`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Staff key id, recorded as the actor in the audit log
    pub actor_id: Uuid,

    pub display_name: String,

    /// Role at the time of the request (`staff`, `admin`, `owner`)
    pub role: String,
}

/// Answers whether an actor holds an elevated role.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn is_elevated(&self, actor_id: Uuid) -> Result<bool, AppError>;
}

/// Authorizer backed by the `staff_keys` table.
///
/// The role is re-read on every call so a revoked or demoted key loses
/// elevated rights immediately.
pub struct StaffRoleAuthorizer {
    pool: DbPool,
}

impl StaffRoleAuthorizer {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Authorizer for StaffRoleAuthorizer {
    async fn is_elevated(&self, actor_id: Uuid) -> Result<bool, AppError> {
        let elevated: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM staff_keys WHERE id = $1 AND is_active = true AND role = ANY($2))",
        )
        .bind(actor_id)
        .bind(ELEVATED_ROLES)
        .fetch_one(&self.pool)
        .await?;

        Ok(elevated)
    }
}

/// Hash a raw staff key the way it is stored.
pub fn hash_key(raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Staff key authentication middleware function.
///
/// # Flow
///
/// 1. Extract `Authorization: Bearer <key>` header from request
/// 2. Hash the `<key>` using SHA-256
/// 3. Query database for matching hash where `is_active = true`
/// 4. If found: inject `AuthContext` into request, call next handler
/// 5. If not found: return 401 Unauthorized error
pub async fn auth_middleware(
    State(pool): State<DbPool>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let staff_key = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    let key_hash = hash_key(staff_key);

    let record = sqlx::query_as::<_, StaffKey>(
        "SELECT id, key_hash, display_name, role, created_at, is_active
         FROM staff_keys
         WHERE key_hash = $1 AND is_active = true",
    )
    .bind(&key_hash)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::Unauthorized)?;

    request.extensions_mut().insert(AuthContext {
        actor_id: record.id,
        display_name: record.display_name,
        role: record.role,
    });

    Ok(next.run(request).await)
}
