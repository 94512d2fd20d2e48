//! Payment processor callback handlers.
//!
//! This module implements the endpoints processors and returning buyers hit:
//! - POST /api/v1/webhooks/card-intents - Card intent events
//! - POST /api/v1/webhooks/hosted-orders - Hosted order events
//! - GET /api/v1/checkout/hosted/return - Buyer approved on the hosted page
//! - GET /api/v1/checkout/hosted/cancel - Buyer abandoned the hosted page
//!
//! # Signatures
//!
//! Webhook bodies are taken as raw bytes so the signature is checked over
//! exactly what was sent. Parsing happens only after verification; a bad
//! signature is a 401 and nothing is read from the payload.

use crate::{
    error::AppError,
    models::{
        order::OrderResponse,
        webhook::{HostedEvent, IntentEvent, WebhookAck},
    },
    services::{checkout_service, order_service, signature},
    state::AppState,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
};
use chrono::Utc;
use serde::Deserialize;

pub const INTENT_SIGNATURE_HEADER: &str = "X-Intent-Signature";
pub const HOSTED_SIGNATURE_HEADER: &str = "X-Webhook-Signature";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|h| h.to_str().ok())
}

/// Card intent processor webhook.
///
/// # Headers
///
/// `X-Intent-Signature: t=<unix seconds>,v1=<hex hmac-sha256 of "t.body">`
///
/// # Response (200)
///
/// ```json
/// { "received": true, "handled": true, "order_id": "770e8400-...", "status": "paid" }
/// ```
pub async fn card_intents_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    signature::verify_timestamped_signature(
        &state.config.card_intents_webhook_secret,
        &body,
        header(&headers, INTENT_SIGNATURE_HEADER),
        Utc::now(),
    )?;

    let event: IntentEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Invalid event payload: {e}")))?;

    let ack = checkout_service::handle_intent_event(&state, &event).await?;

    Ok(Json(ack))
}

/// Hosted order processor webhook.
///
/// # Headers
///
/// `X-Webhook-Signature: sha256=<hex hmac-sha256 of body>`
pub async fn hosted_orders_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    signature::verify_body_signature(
        &state.config.hosted_orders_webhook_secret,
        &body,
        header(&headers, HOSTED_SIGNATURE_HEADER),
    )?;

    let event: HostedEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Invalid event payload: {e}")))?;

    let ack = checkout_service::handle_hosted_event(&state, &event).await?;

    Ok(Json(ack))
}

/// Query string the hosted processor appends to the return and cancel URLs.
#[derive(Debug, Deserialize)]
pub struct HostedReturnParams {
    /// Processor order id
    pub token: String,
}

/// Buyer came back from the hosted page after approving.
///
/// Runs the same confirm as the approval webhook; whichever arrives second
/// sees the order already paid.
pub async fn hosted_return(
    State(state): State<AppState>,
    Query(params): Query<HostedReturnParams>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = checkout_service::confirm_hosted_order(&state, params.token.trim()).await?;
    let (order, items) = order_service::get_order_with_items(&state.pool, order.id).await?;

    Ok(Json(OrderResponse::new(order, items)))
}

/// Buyer abandoned the hosted page.
pub async fn hosted_cancel(
    State(state): State<AppState>,
    Query(params): Query<HostedReturnParams>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = checkout_service::cancel_hosted_order(&state, params.token.trim()).await?;
    let (order, items) = order_service::get_order_with_items(&state.pool, order.id).await?;

    Ok(Json(OrderResponse::new(order, items)))
}
