//! Checkout and order HTTP handlers.
//!
//! This module implements the buyer-facing endpoints:
//! - POST /api/v1/checkout/intent - Start a card intent checkout
//! - POST /api/v1/checkout/hosted - Start a hosted checkout
//! - GET /api/v1/orders/{id} - Order status and items
//! - POST /api/v1/orders/{id}/intent-sync - Re-check a card intent with the processor

use crate::{
    db::DbPool,
    error::AppError,
    models::order::{
        CreateOrderRequest, HostedCheckoutResponse, IntentCheckoutResponse, OrderResponse,
    },
    services::{checkout_service, order_service},
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

/// Start a card intent checkout.
///
/// # Request Body
///
/// ```json
/// {
///   "event_id": "550e8400-...",
///   "buyer_email": "ada@example.com",
///   "buyer_name": "Ada",
///   "items": [{ "ticket_type_id": "660e8400-...", "quantity": 2 }]
/// }
/// ```
///
/// # Response (201)
///
/// ```json
/// {
///   "order_id": "770e8400-...",
///   "client_secret": "pi_..._secret_...",
///   "amount_total_cents": 5000,
///   "currency": "USD"
/// }
/// ```
///
/// # Errors
///
/// - 400: malformed request
/// - 409: insufficient inventory (with `available`)
/// - 422: invalid/inactive ticket type, mixed currencies
/// - 502: processor unavailable (nothing was reserved)
pub async fn create_intent_checkout(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<IntentCheckoutResponse>), AppError> {
    let response = checkout_service::start_intent_checkout(&state, &request).await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Start a hosted checkout. Same body as the intent checkout.
///
/// # Response (201)
///
/// ```json
/// { "order_id": "770e8400-...", "approve_url": "https://.../checkoutnow?token=..." }
/// ```
pub async fn create_hosted_checkout(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<HostedCheckoutResponse>), AppError> {
    let response = checkout_service::start_hosted_checkout(&state, &request).await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Get an order with its items.
pub async fn get_order(
    State(pool): State<DbPool>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let (order, items) = order_service::get_order_with_items(&pool, order_id).await?;

    Ok(Json(OrderResponse::new(order, items)))
}

/// Client-reported completion of a card intent payment.
///
/// The request carries no payment claim; the intent is re-read from the
/// processor and its status applied. Returns the order as it now stands.
pub async fn sync_intent(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = checkout_service::sync_intent_status(&state, order_id).await?;
    let (order, items) = order_service::get_order_with_items(&state.pool, order.id).await?;

    Ok(Json(OrderResponse::new(order, items)))
}
