//! Check-in HTTP handler.
//!
//! - POST /api/v1/check-in - Check in or undo (staff key required)

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::check_in::{CheckInRequest, CheckInResponse},
    services::check_in_service,
    state::AppState,
};
use axum::{Extension, Json, extract::State};

/// Check in a ticket or guest pass, or undo a ticket check-in.
///
/// # Request Body
///
/// ```json
/// { "token": "tkt_5f1c...", "action": "check_in", "source": "scanner" }
/// ```
///
/// # Response (200)
///
/// ```json
/// { "kind": "ticket", "action": "check_in", "ticket": { "id": "…", "status": "checked_in", … } }
/// ```
///
/// # Errors
///
/// - 404: unknown token (echoed back in `error.token`)
/// - 409: already checked in (with `error.at`) or, for undo, not checked in
/// - 403: undo by a non-elevated actor
/// - 400: undo without a reason of at least five characters, or undo of a guest pass
/// - 429: rate limit exceeded
pub async fn check_in(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CheckInRequest>,
) -> Result<Json<CheckInResponse>, AppError> {
    let response =
        check_in_service::process(&state.pool, state.authorizer.as_ref(), &auth, &request).await?;

    Ok(Json(response))
}
