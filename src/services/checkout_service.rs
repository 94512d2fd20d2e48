//! Checkout service - bridges orders and the two payment processors.
//!
//! This service handles:
//! - Starting a checkout (order + reservation + processor object)
//! - Applying processor outcomes (webhooks, browser return, client sync)
//!   to the order state machine
//! - Dispatching the ticket email after a paid transition commits
//!
//! # Correlation
//!
//! The local order id is generated before anything is written and sent to
//! the processor as the correlation id (intent `metadata.order_id`, hosted
//! order `custom_id`). The processor's own id is stored on the order as
//! `processor_ref`. Inbound events are resolved through one of the two and
//! cross-checked against the other where both are present.
//!
//! # Atomicity
//!
//! The processor object is created inside the local transaction that holds
//! the reservation. If the processor call fails the transaction is dropped
//! and rolled back, so no reservation outlives a failed checkout. If the
//! commit fails after the processor object exists, the intent is canceled
//! best-effort; an orphaned hosted order simply expires unapproved.

use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        order::{
            CreateOrderRequest, HostedCheckoutResponse, IntentCheckoutResponse, Order,
            OrderStatus, PaymentProcessor,
        },
        webhook::{
            CAPTURE_COMPLETED, CAPTURE_DENIED, HostedEvent, INTENT_CANCELED,
            INTENT_PAYMENT_FAILED, INTENT_SUCCEEDED, IntentEvent, ORDER_APPROVED, ORDER_VOIDED,
            WebhookAck,
        },
    },
    services::{
        notification_service,
        order_service::{self, TransitionOutcome},
        processors::{CaptureStatus, IntentStatus, PaymentIntent},
    },
    state::AppState,
};

/// Start a card intent checkout.
///
/// # Process
///
/// 1. Generate the order id
/// 2. Begin transaction; create the order and reserve inventory
/// 3. Create the processor intent with the order id as correlation id
/// 4. Store the intent id on the order
/// 5. Commit
///
/// # Errors
///
/// - Any `create_order` error (nothing is written)
/// - `Upstream`: the processor rejected or did not answer (nothing is written)
/// - `Database`: commit failed (the intent is canceled best-effort)
pub async fn start_intent_checkout(
    state: &AppState,
    request: &CreateOrderRequest,
) -> Result<IntentCheckoutResponse, AppError> {
    let order_id = Uuid::new_v4();
    let mut tx = state.pool.begin().await?;

    let order = order_service::create_order(&mut tx, order_id, request).await?;

    let intent = state
        .intents
        .create_intent(order.amount_total_cents, &order.currency, order_id)
        .await?;

    let Some(client_secret) = intent.client_secret.clone() else {
        cancel_intent_best_effort(state, order_id, &intent.id).await;
        return Err(AppError::Upstream(
            "Processor returned an intent without a client secret".to_string(),
        ));
    };

    let intent_id = intent.id.clone();
    let committed: Result<(), AppError> = async move {
        order_service::set_processor_ref(&mut tx, order_id, PaymentProcessor::CardIntents, &intent_id)
            .await?;
        tx.commit().await?;
        Ok(())
    }
    .await;

    if let Err(e) = committed {
        tracing::error!(%order_id, intent_id = %intent.id, error = %e, "Checkout commit failed after intent creation");
        cancel_intent_best_effort(state, order_id, &intent.id).await;
        return Err(e);
    }

    tracing::info!(%order_id, intent_id = %intent.id, amount = order.amount_total_cents, "Intent checkout started");

    Ok(IntentCheckoutResponse {
        order_id,
        client_secret,
        amount_total_cents: order.amount_total_cents,
        currency: order.currency,
    })
}

async fn cancel_intent_best_effort(state: &AppState, order_id: Uuid, intent_id: &str) {
    if let Err(e) = state.intents.cancel_intent(intent_id).await {
        tracing::error!(%order_id, %intent_id, error = %e, "Failed to cancel orphaned intent");
    }
}

/// Start a hosted checkout. Same transactional shape as
/// [`start_intent_checkout`]; the buyer is sent to `approve_url`.
pub async fn start_hosted_checkout(
    state: &AppState,
    request: &CreateOrderRequest,
) -> Result<HostedCheckoutResponse, AppError> {
    let order_id = Uuid::new_v4();
    let (return_url, cancel_url) = state.config.hosted_return_urls();
    let mut tx = state.pool.begin().await?;

    let order = order_service::create_order(&mut tx, order_id, request).await?;

    let hosted = state
        .hosted
        .create_order(
            order.amount_total_cents,
            &order.currency,
            order_id,
            &return_url,
            &cancel_url,
        )
        .await?;

    order_service::set_processor_ref(&mut tx, order_id, PaymentProcessor::HostedOrders, &hosted.id)
        .await?;

    if let Err(e) = tx.commit().await {
        tracing::error!(
            %order_id,
            processor_order_id = %hosted.id,
            error = %e,
            "Checkout commit failed after hosted order creation; it will expire unapproved"
        );
        return Err(e.into());
    }

    tracing::info!(%order_id, processor_order_id = %hosted.id, "Hosted checkout started");

    Ok(HostedCheckoutResponse {
        order_id,
        approve_url: hosted.approve_url,
    })
}

/// Mark an order paid and send its tickets.
///
/// The email goes out only when this call minted the tickets.
async fn confirm_paid(state: &AppState, order_id: Uuid) -> Result<Order, AppError> {
    let paid = order_service::transition_to_paid(&state.pool, order_id).await?;

    if paid.outcome == TransitionOutcome::Applied {
        notification_service::dispatch_ticket_email(
            state.mailer.clone(),
            &state.config,
            &paid.order,
            &paid.tickets,
        );
    }

    Ok(paid.order)
}

/// Apply an intent's processor-reported status to its order.
///
/// Only final intent states move the order. `failed` is applied only when
/// `declined` is set: a returned `requires_payment_method` on its own just
/// means the buyer has not paid yet and may retry.
async fn apply_intent(
    state: &AppState,
    order: Order,
    intent: &PaymentIntent,
    declined: bool,
) -> Result<Order, AppError> {
    match intent.status {
        IntentStatus::Succeeded => confirm_paid(state, order.id).await,
        IntentStatus::Canceled => {
            Ok(order_service::transition_to_canceled(&state.pool, order.id).await?.order)
        }
        IntentStatus::RequiresPaymentMethod if declined => {
            Ok(order_service::transition_to_failed(&state.pool, order.id).await?.order)
        }
        _ => Ok(order),
    }
}

/// Handle a verified card intent webhook.
///
/// # Event Mapping
///
/// - `payment_intent.succeeded` ⇒ paid
/// - `payment_intent.payment_failed` ⇒ failed
/// - `payment_intent.canceled` ⇒ canceled
/// - anything else ⇒ acknowledged, ignored
///
/// Unknown orders are acknowledged as unhandled; a retry would not help.
pub async fn handle_intent_event(
    state: &AppState,
    event: &IntentEvent,
) -> Result<WebhookAck, AppError> {
    let target = match event.event_type.as_str() {
        INTENT_SUCCEEDED => OrderStatus::Paid,
        INTENT_PAYMENT_FAILED => OrderStatus::Failed,
        INTENT_CANCELED => OrderStatus::Canceled,
        other => {
            tracing::debug!(event_id = %event.id, event_type = other, "Ignoring intent event");
            return Ok(WebhookAck::ignored());
        }
    };

    let intent = event
        .intent()
        .map_err(|e| AppError::Validation(format!("Invalid payment intent in event: {e}")))?;

    let Some(order_id) = intent.order_id() else {
        tracing::warn!(event_id = %event.id, intent_id = %intent.id, "Intent event without order correlation");
        return Ok(WebhookAck::ignored());
    };

    let order = match order_service::find_order(&state.pool, order_id).await {
        Ok(order) => order,
        Err(AppError::NotFound { .. }) => {
            tracing::warn!(event_id = %event.id, %order_id, "Intent event for unknown order");
            return Ok(WebhookAck::ignored());
        }
        Err(e) => return Err(e),
    };

    if order.processor_ref.as_deref() != Some(intent.id.as_str()) {
        tracing::warn!(%order_id, intent_id = %intent.id, "Intent does not belong to order, ignoring");
        return Ok(WebhookAck::ignored());
    }

    let order = match target {
        OrderStatus::Paid => confirm_paid(state, order_id).await?,
        OrderStatus::Failed => order_service::transition_to_failed(&state.pool, order_id).await?.order,
        _ => order_service::transition_to_canceled(&state.pool, order_id).await?.order,
    };

    tracing::info!(event_id = %event.id, %order_id, status = order.status.as_str(), "Intent event applied");

    Ok(WebhookAck::handled(order.id, order.status))
}

/// Re-check a card intent order with the processor.
///
/// Called when the buyer's client reports completion. The client's claim is
/// never trusted: the intent is retrieved and its status applied.
///
/// # Errors
///
/// - `NotFound`: no such order
/// - `Validation`: the order was not paid through the intent processor
/// - `Upstream`: the processor could not be reached
pub async fn sync_intent_status(state: &AppState, order_id: Uuid) -> Result<Order, AppError> {
    let order = order_service::find_order(&state.pool, order_id).await?;

    let intent_id = match (order.processor, &order.processor_ref) {
        (Some(PaymentProcessor::CardIntents), Some(intent_id)) => intent_id.clone(),
        _ => {
            return Err(AppError::Validation(
                "Order is not a card intent checkout".to_string(),
            ));
        }
    };

    if order.status.is_terminal() {
        return Ok(order);
    }

    let intent = state.intents.retrieve_intent(&intent_id).await?;
    let declined = intent.last_payment_error.is_some();

    apply_intent(state, order, &intent, declined).await
}

/// Confirm a hosted order: the single path shared by the approval webhook
/// and the browser return.
///
/// # Process
///
/// 1. Look up the local order by processor order id
/// 2. Already `paid` ⇒ return it; `failed`/`canceled` ⇒ return it unchanged
/// 3. Capture with the processor (idempotent per processor order)
/// 4. Verify the returned correlation id matches the local order
/// 5. Completed ⇒ paid; declined ⇒ failed; pending ⇒ stays pending
///
/// # Errors
///
/// - `NotFound`: no order for this processor order id
/// - `Upstream`: capture failed or returned a mismatched reference
pub async fn confirm_hosted_order(
    state: &AppState,
    processor_order_id: &str,
) -> Result<Order, AppError> {
    let order = order_service::find_by_processor_ref(&state.pool, processor_order_id)
        .await?
        .ok_or_else(|| {
            AppError::not_found(format!("No order for processor order {processor_order_id}"))
        })?;

    if order.status.is_terminal() {
        tracing::info!(
            order_id = %order.id,
            status = order.status.as_str(),
            "Hosted order already final, confirm is a no-op"
        );
        return Ok(order);
    }

    let capture = state.hosted.capture_order(processor_order_id).await?;

    match capture.reference.as_deref().map(str::trim) {
        Some(reference) if reference != order.id.to_string() => {
            tracing::error!(
                order_id = %order.id,
                %processor_order_id,
                reference,
                "Capture reference does not match order"
            );
            return Err(AppError::Upstream(
                "Capture reference does not match order".to_string(),
            ));
        }
        Some(_) => {}
        None => {
            tracing::warn!(order_id = %order.id, %processor_order_id, "Capture carried no reference");
        }
    }

    match capture.status {
        CaptureStatus::Completed => confirm_paid(state, order.id).await,
        CaptureStatus::Declined => {
            Ok(order_service::transition_to_failed(&state.pool, order.id).await?.order)
        }
        CaptureStatus::Pending => {
            tracing::info!(order_id = %order.id, %processor_order_id, "Capture pending");
            Ok(order)
        }
    }
}

/// Buyer abandoned the hosted page.
pub async fn cancel_hosted_order(
    state: &AppState,
    processor_order_id: &str,
) -> Result<Order, AppError> {
    let order = order_service::find_by_processor_ref(&state.pool, processor_order_id)
        .await?
        .ok_or_else(|| {
            AppError::not_found(format!("No order for processor order {processor_order_id}"))
        })?;

    Ok(order_service::transition_to_canceled(&state.pool, order.id).await?.order)
}

/// Handle a verified hosted order webhook.
///
/// # Event Mapping
///
/// - `CHECKOUT.ORDER.APPROVED` ⇒ [`confirm_hosted_order`] (resource id)
/// - `PAYMENT.CAPTURE.COMPLETED` ⇒ paid (`custom_id`, hosted orders only)
/// - `PAYMENT.CAPTURE.DENIED` ⇒ failed (`custom_id`, hosted orders only)
/// - `CHECKOUT.ORDER.VOIDED` ⇒ canceled (resource id)
/// - anything else ⇒ acknowledged, ignored
pub async fn handle_hosted_event(
    state: &AppState,
    event: &HostedEvent,
) -> Result<WebhookAck, AppError> {
    let resource = &event.resource;

    let result = match event.event_type.as_str() {
        ORDER_APPROVED | ORDER_VOIDED => {
            let Some(processor_order_id) = resource.id.as_deref() else {
                tracing::warn!(event_id = %event.id, "Hosted order event without resource id");
                return Ok(WebhookAck::ignored());
            };
            if event.event_type == ORDER_APPROVED {
                confirm_hosted_order(state, processor_order_id).await
            } else {
                cancel_hosted_order(state, processor_order_id).await
            }
        }
        CAPTURE_COMPLETED | CAPTURE_DENIED => {
            let Some(order_id) = resource.order_id() else {
                tracing::warn!(event_id = %event.id, "Capture event without order correlation");
                return Ok(WebhookAck::ignored());
            };
            let order = match order_service::find_order(&state.pool, order_id).await {
                Ok(order) => order,
                Err(AppError::NotFound { .. }) => {
                    tracing::warn!(event_id = %event.id, %order_id, "Capture event for unknown order");
                    return Ok(WebhookAck::ignored());
                }
                Err(e) => return Err(e),
            };
            if order.processor != Some(PaymentProcessor::HostedOrders) {
                tracing::warn!(
                    event_id = %event.id,
                    %order_id,
                    "Capture event for an order not paid through hosted checkout, ignoring"
                );
                return Ok(WebhookAck::ignored());
            }
            if event.event_type == CAPTURE_COMPLETED {
                confirm_paid(state, order_id).await
            } else {
                order_service::transition_to_failed(&state.pool, order_id)
                    .await
                    .map(|closed| closed.order)
            }
        }
        other => {
            tracing::debug!(event_id = %event.id, event_type = other, "Ignoring hosted event");
            return Ok(WebhookAck::ignored());
        }
    };

    match result {
        Ok(order) => {
            tracing::info!(
                event_id = %event.id,
                order_id = %order.id,
                status = order.status.as_str(),
                "Hosted event applied"
            );
            Ok(WebhookAck::handled(order.id, order.status))
        }
        Err(AppError::NotFound { .. }) => {
            tracing::warn!(event_id = %event.id, "Hosted event for unknown order");
            Ok(WebhookAck::ignored())
        }
        Err(e) => Err(e),
    }
}
