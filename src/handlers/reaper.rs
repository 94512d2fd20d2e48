//! Reaper trigger endpoint.
//!
//! - POST /api/v1/reaper/sweep?ttl_minutes=N - Fail stale pending orders
//!
//! Meant for an external scheduler. The shared secret is accepted from the
//! `X-Reaper-Secret` header or the `secret` query parameter and is checked
//! before any data is read.

use crate::{
    error::AppError,
    services::{
        reaper_service::{self, ReapSummary},
        signature,
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
};
use serde::Deserialize;

pub const REAPER_SECRET_HEADER: &str = "X-Reaper-Secret";

#[derive(Debug, Deserialize)]
pub struct SweepParams {
    /// Age in minutes after which a pending order is stale
    pub ttl_minutes: Option<i64>,
    pub secret: Option<String>,
}

/// Run one reaper sweep.
///
/// # Response (200)
///
/// ```json
/// { "scanned": 4, "released": 3, "skipped": 0 }
/// ```
///
/// # Errors
///
/// - 401: missing or wrong secret
/// - 400: `ttl_minutes` not positive or longer than a year
pub async fn sweep(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SweepParams>,
) -> Result<Json<ReapSummary>, AppError> {
    let provided = headers
        .get(REAPER_SECRET_HEADER)
        .and_then(|h| h.to_str().ok())
        .or(params.secret.as_deref())
        .ok_or(AppError::Unauthorized)?;

    if !signature::secrets_match(&state.config.reaper_secret, provided) {
        tracing::warn!("Reaper sweep rejected: bad secret");
        return Err(AppError::Unauthorized);
    }

    let ttl = reaper_service::ttl_from_minutes(
        params
            .ttl_minutes
            .unwrap_or(state.config.reservation_ttl_minutes),
    )?;

    let summary = reaper_service::sweep(&state.pool, ttl).await?;

    Ok(Json(summary))
}
