//! Fixed-window rate limiting for staff endpoints.
//!
//! Counters live in Postgres (`rate_limit_hits`) so every server instance
//! shares them. Each request increments the counter for its bucket and the
//! current window in one upsert; once the count passes the limit the request
//! is rejected with HTTP 429 and a `Retry-After` header, and the handler is
//! never reached.
//!
//! # Bucket Key
//!
//! Two limiters guard the staff routes:
//! - before authentication, `ip:<first X-Forwarded-For address>` (or
//!   `ip:unknown`), so rejected keys are counted too
//! - after authentication, `actor:<staff key id>`

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, TimeZone, Utc};

use crate::{db::DbPool, error::AppError, middleware::auth::AuthContext, state::AppState};

/// Start of the fixed window containing `now`, and seconds until it ends.
pub fn window_bounds(now: DateTime<Utc>, window_secs: i64) -> (DateTime<Utc>, u64) {
    let window_secs = window_secs.max(1);
    let epoch = now.timestamp();
    let start = epoch - epoch.rem_euclid(window_secs);
    let remaining = (start + window_secs - epoch).max(1) as u64;
    let start = Utc.timestamp_opt(start, 0).single().unwrap_or(now);
    (start, remaining)
}

/// Count one hit for `key` and reject it if the window's limit is exceeded.
///
/// # Errors
///
/// - `RateLimited`: more than `limit` hits in the current window
/// - `Database`: the counter could not be updated
pub async fn check_and_record(
    pool: &DbPool,
    key: &str,
    limit: i32,
    window_secs: i64,
) -> Result<(), AppError> {
    let (window_start, retry_after_secs) = window_bounds(Utc::now(), window_secs);

    let hits: i32 = sqlx::query_scalar(
        r#"
        INSERT INTO rate_limit_hits (bucket_key, window_start, hits)
        VALUES ($1, $2, 1)
        ON CONFLICT (bucket_key, window_start)
        DO UPDATE SET hits = rate_limit_hits.hits + 1
        RETURNING hits
        "#,
    )
    .bind(key)
    .bind(window_start)
    .fetch_one(pool)
    .await?;

    if hits == 1 {
        // First hit in a new window; drop this bucket's older windows
        sqlx::query("DELETE FROM rate_limit_hits WHERE bucket_key = $1 AND window_start < $2")
            .bind(key)
            .bind(window_start)
            .execute(pool)
            .await?;
    }

    if hits > limit {
        tracing::warn!(bucket = %key, hits, limit, "Rate limit exceeded");
        return Err(AppError::RateLimited { retry_after_secs });
    }

    Ok(())
}

fn ip_bucket_key(request: &Request) -> String {
    let forwarded = request
        .headers()
        .get("X-Forwarded-For")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    match forwarded {
        Some(ip) => format!("ip:{ip}"),
        None => "ip:unknown".to_string(),
    }
}

fn actor_bucket_key(request: &Request) -> Option<String> {
    request
        .extensions()
        .get::<AuthContext>()
        .map(|auth| format!("actor:{}", auth.actor_id))
}

/// Per-address rate limiting, applied before authentication.
///
/// Counts every request including ones that fail authentication, so
/// staff key guessing from one address is throttled.
pub async fn ip_rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = ip_bucket_key(&request);

    check_and_record(
        &state.pool,
        &key,
        state.config.check_in_ip_rate_limit,
        state.config.check_in_rate_window_secs,
    )
    .await?;

    Ok(next.run(request).await)
}

/// Per-actor rate limiting.
///
/// Must run after [`auth_middleware`](crate::middleware::auth::auth_middleware)
/// so the request carries its [`AuthContext`].
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Unauthenticated requests were already counted per address
    let Some(key) = actor_bucket_key(&request) else {
        return Ok(next.run(request).await);
    };

    check_and_record(
        &state.pool,
        &key,
        state.config.check_in_rate_limit,
        state.config.check_in_rate_window_secs,
    )
    .await?;

    Ok(next.run(request).await)
}
