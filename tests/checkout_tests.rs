//! Integration tests for both checkout flows against fake processors.

mod common;

use std::sync::atomic::Ordering;

use common::{
    order_count, order_request, order_status, quantity_sold, seed_event, seed_ticket_type,
    test_context, ticket_count,
};
use futures::future::join_all;
use sqlx::PgPool;
use ticketing_server::error::AppError;
use ticketing_server::models::order::{OrderStatus, PaymentProcessor};
use ticketing_server::models::webhook::{
    HostedEvent, HostedEventResource, IntentEvent, IntentEventData,
};
use ticketing_server::services::processors::{CaptureStatus, IntentStatus, PaymentIntent};
use ticketing_server::services::{checkout_service, order_service};
use uuid::Uuid;

fn intent_event(event_type: &str, intent: PaymentIntent) -> IntentEvent {
    IntentEvent {
        id: format!("evt_{}", Uuid::new_v4().simple()),
        event_type: event_type.to_string(),
        data: IntentEventData {
            object: serde_json::to_value(intent).unwrap(),
        },
    }
}

fn hosted_event(event_type: &str, id: Option<&str>, custom_id: Option<Uuid>) -> HostedEvent {
    HostedEvent {
        id: format!("WH-{}", Uuid::new_v4().simple()),
        event_type: event_type.to_string(),
        resource: HostedEventResource {
            id: id.map(str::to_string),
            custom_id: custom_id.map(|id| id.to_string()),
        },
    }
}

// ---------------------------------------------------------------------------
// Card intents
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn intent_checkout_reserves_and_links_intent(pool: PgPool) {
    let ctx = test_context(pool);
    let event_id = seed_event(ctx.pool()).await;
    let tt = seed_ticket_type(ctx.pool(), event_id, 10, 2500, "USD").await;

    let response = checkout_service::start_intent_checkout(&ctx.state, &order_request(event_id, &[(tt, 2)]))
        .await
        .unwrap();

    assert_eq!(response.amount_total_cents, 5000);
    assert!(response.client_secret.ends_with("_secret"));

    let order = order_service::find_order(ctx.pool(), response.order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.processor, Some(PaymentProcessor::CardIntents));
    let intent = ctx.intents.get(order.processor_ref.as_deref().unwrap());
    assert_eq!(intent.order_id(), Some(order.id));
    assert_eq!(quantity_sold(ctx.pool(), tt).await, 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn processor_failure_leaves_no_reservation(pool: PgPool) {
    let ctx = test_context(pool);
    let event_id = seed_event(ctx.pool()).await;
    let tt = seed_ticket_type(ctx.pool(), event_id, 10, 2500, "USD").await;
    ctx.intents.fail_create.store(true, Ordering::SeqCst);

    let err = checkout_service::start_intent_checkout(&ctx.state, &order_request(event_id, &[(tt, 2)]))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Upstream(_)));
    assert_eq!(order_count(ctx.pool()).await, 0);
    assert_eq!(quantity_sold(ctx.pool(), tt).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn succeeded_webhook_pays_once_and_emails_once(pool: PgPool) {
    let ctx = test_context(pool);
    let event_id = seed_event(ctx.pool()).await;
    let tt = seed_ticket_type(ctx.pool(), event_id, 10, 2500, "USD").await;
    let started = checkout_service::start_intent_checkout(&ctx.state, &order_request(event_id, &[(tt, 2)]))
        .await
        .unwrap();
    let order = order_service::find_order(ctx.pool(), started.order_id).await.unwrap();
    let intent_id = order.processor_ref.unwrap();
    ctx.intents.set_status(&intent_id, IntentStatus::Succeeded, false);
    let event = intent_event("payment_intent.succeeded", ctx.intents.get(&intent_id));

    let ack = checkout_service::handle_intent_event(&ctx.state, &event).await.unwrap();
    let replay = checkout_service::handle_intent_event(&ctx.state, &event).await.unwrap();

    assert!(ack.handled);
    assert_eq!(ack.status, Some(OrderStatus::Paid));
    assert_eq!(replay.status, Some(OrderStatus::Paid));
    assert_eq!(ticket_count(ctx.pool(), order.id).await, 2);
    assert_eq!(quantity_sold(ctx.pool(), tt).await, 2);

    assert_eq!(ctx.mailer.wait_for(1).await, 1);
    let email = ctx.mailer.sent.lock().unwrap()[0].clone();
    assert_eq!(email.to, "ada@example.com");
    assert_eq!(email.body.matches("https://tickets.test/t/tkt_").count(), 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn failed_webhook_releases_inventory(pool: PgPool) {
    let ctx = test_context(pool);
    let event_id = seed_event(ctx.pool()).await;
    let tt = seed_ticket_type(ctx.pool(), event_id, 10, 2500, "USD").await;
    let started = checkout_service::start_intent_checkout(&ctx.state, &order_request(event_id, &[(tt, 3)]))
        .await
        .unwrap();
    let intent_id = order_service::find_order(ctx.pool(), started.order_id)
        .await
        .unwrap()
        .processor_ref
        .unwrap();
    ctx.intents.set_status(&intent_id, IntentStatus::RequiresPaymentMethod, true);
    let event = intent_event("payment_intent.payment_failed", ctx.intents.get(&intent_id));

    checkout_service::handle_intent_event(&ctx.state, &event).await.unwrap();

    assert_eq!(order_status(ctx.pool(), started.order_id).await, OrderStatus::Failed);
    assert_eq!(quantity_sold(ctx.pool(), tt).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn webhook_for_foreign_intent_is_ignored(pool: PgPool) {
    let ctx = test_context(pool);
    let event_id = seed_event(ctx.pool()).await;
    let tt = seed_ticket_type(ctx.pool(), event_id, 10, 2500, "USD").await;
    let started = checkout_service::start_intent_checkout(&ctx.state, &order_request(event_id, &[(tt, 1)]))
        .await
        .unwrap();
    let intent_id = order_service::find_order(ctx.pool(), started.order_id)
        .await
        .unwrap()
        .processor_ref
        .unwrap();
    let mut forged = ctx.intents.get(&intent_id);
    forged.id = "pi_someone_else".to_string();
    forged.status = IntentStatus::Succeeded;

    let ack = checkout_service::handle_intent_event(
        &ctx.state,
        &intent_event("payment_intent.succeeded", forged),
    )
    .await
    .unwrap();

    assert!(!ack.handled);
    assert_eq!(order_status(ctx.pool(), started.order_id).await, OrderStatus::Pending);
}

#[sqlx::test(migrations = "./migrations")]
async fn unrelated_event_types_are_acknowledged(pool: PgPool) {
    let ctx = test_context(pool);
    let event_id = seed_event(ctx.pool()).await;
    let tt = seed_ticket_type(ctx.pool(), event_id, 10, 2500, "USD").await;
    let started = checkout_service::start_intent_checkout(&ctx.state, &order_request(event_id, &[(tt, 1)]))
        .await
        .unwrap();
    let intent_id = order_service::find_order(ctx.pool(), started.order_id)
        .await
        .unwrap()
        .processor_ref
        .unwrap();

    let ack = checkout_service::handle_intent_event(
        &ctx.state,
        &intent_event("payment_intent.created", ctx.intents.get(&intent_id)),
    )
    .await
    .unwrap();

    assert!(ack.received);
    assert!(!ack.handled);

    let customer = IntentEvent {
        id: "evt_customer".to_string(),
        event_type: "customer.created".to_string(),
        data: IntentEventData {
            object: serde_json::json!({ "id": "cus_1", "email": "ada@example.com" }),
        },
    };
    let ack = checkout_service::handle_intent_event(&ctx.state, &customer).await.unwrap();

    assert!(!ack.handled);
    assert_eq!(order_status(ctx.pool(), started.order_id).await, OrderStatus::Pending);
}

#[sqlx::test(migrations = "./migrations")]
async fn sync_rechecks_processor_instead_of_trusting_client(pool: PgPool) {
    let ctx = test_context(pool);
    let event_id = seed_event(ctx.pool()).await;
    let tt = seed_ticket_type(ctx.pool(), event_id, 10, 2500, "USD").await;
    let started = checkout_service::start_intent_checkout(&ctx.state, &order_request(event_id, &[(tt, 1)]))
        .await
        .unwrap();

    // processor still waiting on the buyer
    let order = checkout_service::sync_intent_status(&ctx.state, started.order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);

    let intent_id = order.processor_ref.clone().unwrap();
    ctx.intents.set_status(&intent_id, IntentStatus::Succeeded, false);

    let order = checkout_service::sync_intent_status(&ctx.state, started.order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(ticket_count(ctx.pool(), order.id).await, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn sync_rejects_hosted_orders(pool: PgPool) {
    let ctx = test_context(pool);
    let event_id = seed_event(ctx.pool()).await;
    let tt = seed_ticket_type(ctx.pool(), event_id, 10, 2500, "USD").await;
    let started = checkout_service::start_hosted_checkout(&ctx.state, &order_request(event_id, &[(tt, 1)]))
        .await
        .unwrap();

    let err = checkout_service::sync_intent_status(&ctx.state, started.order_id)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
}

// ---------------------------------------------------------------------------
// Hosted orders
// ---------------------------------------------------------------------------

async fn start_hosted(ctx: &common::TestContext, quantity: i32) -> (Uuid, Uuid, String) {
    let event_id = seed_event(ctx.pool()).await;
    let tt = seed_ticket_type(ctx.pool(), event_id, 10, 4000, "USD").await;
    let started = checkout_service::start_hosted_checkout(&ctx.state, &order_request(event_id, &[(tt, quantity)]))
        .await
        .unwrap();
    let processor_order_id = order_service::find_order(ctx.pool(), started.order_id)
        .await
        .unwrap()
        .processor_ref
        .unwrap();
    assert!(started.approve_url.contains(&processor_order_id));
    (started.order_id, tt, processor_order_id)
}

#[sqlx::test(migrations = "./migrations")]
async fn hosted_confirm_is_idempotent(pool: PgPool) {
    let ctx = test_context(pool);
    let (order_id, tt, processor_order_id) = start_hosted(&ctx, 2).await;

    let first = checkout_service::confirm_hosted_order(&ctx.state, &processor_order_id).await.unwrap();
    let second = checkout_service::confirm_hosted_order(&ctx.state, &processor_order_id).await.unwrap();

    assert_eq!(first.status, OrderStatus::Paid);
    assert_eq!(second.status, OrderStatus::Paid);
    assert_eq!(ctx.hosted.capture_calls.load(Ordering::SeqCst), 1);
    assert_eq!(ticket_count(ctx.pool(), order_id).await, 2);
    assert_eq!(quantity_sold(ctx.pool(), tt).await, 2);
    assert_eq!(ctx.mailer.wait_for(1).await, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn webhook_and_return_racing_issue_tickets_once(pool: PgPool) {
    let ctx = test_context(pool);
    let (order_id, _, processor_order_id) = start_hosted(&ctx, 3).await;

    let confirms = (0..4).map(|_| {
        let state = ctx.state.clone();
        let id = processor_order_id.clone();
        tokio::spawn(async move { checkout_service::confirm_hosted_order(&state, &id).await })
    });
    let results = join_all(confirms).await;

    for result in results {
        assert_eq!(result.unwrap().unwrap().status, OrderStatus::Paid);
    }
    assert_eq!(ticket_count(ctx.pool(), order_id).await, 3);
    assert_eq!(ctx.mailer.wait_for(1).await, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn mismatched_capture_reference_is_rejected(pool: PgPool) {
    let ctx = test_context(pool);
    let (order_id, tt, processor_order_id) = start_hosted(&ctx, 1).await;
    ctx.hosted
        .set_reference(&processor_order_id, &Uuid::new_v4().to_string());

    let err = checkout_service::confirm_hosted_order(&ctx.state, &processor_order_id)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Upstream(_)));
    assert_eq!(order_status(ctx.pool(), order_id).await, OrderStatus::Pending);
    assert_eq!(ticket_count(ctx.pool(), order_id).await, 0);
    assert_eq!(quantity_sold(ctx.pool(), tt).await, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn declined_capture_fails_order(pool: PgPool) {
    let ctx = test_context(pool);
    let (order_id, tt, processor_order_id) = start_hosted(&ctx, 2).await;
    ctx.hosted
        .set_capture_status(&processor_order_id, CaptureStatus::Declined);

    let order = checkout_service::confirm_hosted_order(&ctx.state, &processor_order_id).await.unwrap();

    assert_eq!(order.status, OrderStatus::Failed);
    assert_eq!(quantity_sold(ctx.pool(), tt).await, 0);
    assert_eq!(ticket_count(ctx.pool(), order_id).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn pending_capture_leaves_order_pending(pool: PgPool) {
    let ctx = test_context(pool);
    let (order_id, _, processor_order_id) = start_hosted(&ctx, 1).await;
    ctx.hosted
        .set_capture_status(&processor_order_id, CaptureStatus::Pending);

    let order = checkout_service::confirm_hosted_order(&ctx.state, &processor_order_id).await.unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(ticket_count(ctx.pool(), order_id).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn buyer_cancel_releases_and_blocks_later_confirm(pool: PgPool) {
    let ctx = test_context(pool);
    let (order_id, tt, processor_order_id) = start_hosted(&ctx, 2).await;

    let canceled = checkout_service::cancel_hosted_order(&ctx.state, &processor_order_id).await.unwrap();
    assert_eq!(canceled.status, OrderStatus::Canceled);
    assert_eq!(quantity_sold(ctx.pool(), tt).await, 0);

    let late = checkout_service::confirm_hosted_order(&ctx.state, &processor_order_id).await.unwrap();
    assert_eq!(late.status, OrderStatus::Canceled);
    assert_eq!(ctx.hosted.capture_calls.load(Ordering::SeqCst), 0);
    assert_eq!(ticket_count(ctx.pool(), order_id).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn hosted_events_map_to_transitions(pool: PgPool) {
    let ctx = test_context(pool);
    let (paid_order, _, _) = start_hosted(&ctx, 1).await;
    let (denied_order, denied_tt, _) = start_hosted(&ctx, 1).await;
    let (voided_order, voided_tt, voided_ref) = start_hosted(&ctx, 1).await;

    let ack = checkout_service::handle_hosted_event(
        &ctx.state,
        &hosted_event("PAYMENT.CAPTURE.COMPLETED", Some("CAPTURE-1"), Some(paid_order)),
    )
    .await
    .unwrap();
    assert_eq!(ack.status, Some(OrderStatus::Paid));

    checkout_service::handle_hosted_event(
        &ctx.state,
        &hosted_event("PAYMENT.CAPTURE.DENIED", Some("CAPTURE-2"), Some(denied_order)),
    )
    .await
    .unwrap();
    assert_eq!(order_status(ctx.pool(), denied_order).await, OrderStatus::Failed);
    assert_eq!(quantity_sold(ctx.pool(), denied_tt).await, 0);

    checkout_service::handle_hosted_event(
        &ctx.state,
        &hosted_event("CHECKOUT.ORDER.VOIDED", Some(&voided_ref), None),
    )
    .await
    .unwrap();
    assert_eq!(order_status(ctx.pool(), voided_order).await, OrderStatus::Canceled);
    assert_eq!(quantity_sold(ctx.pool(), voided_tt).await, 0);

    let unknown = checkout_service::handle_hosted_event(
        &ctx.state,
        &hosted_event("CHECKOUT.ORDER.APPROVED", Some("HO-NOPE"), None),
    )
    .await
    .unwrap();
    assert!(!unknown.handled);
}

#[sqlx::test(migrations = "./migrations")]
async fn capture_events_cannot_touch_intent_orders(pool: PgPool) {
    let ctx = test_context(pool);
    let event_id = seed_event(ctx.pool()).await;
    let tt = seed_ticket_type(ctx.pool(), event_id, 10, 2500, "USD").await;
    let started = checkout_service::start_intent_checkout(&ctx.state, &order_request(event_id, &[(tt, 2)]))
        .await
        .unwrap();

    for event_type in ["PAYMENT.CAPTURE.COMPLETED", "PAYMENT.CAPTURE.DENIED"] {
        let ack = checkout_service::handle_hosted_event(
            &ctx.state,
            &hosted_event(event_type, Some("CAPTURE-X"), Some(started.order_id)),
        )
        .await
        .unwrap();
        assert!(!ack.handled, "{event_type}");
    }

    assert_eq!(order_status(ctx.pool(), started.order_id).await, OrderStatus::Pending);
    assert_eq!(ticket_count(ctx.pool(), started.order_id).await, 0);
    assert_eq!(quantity_sold(ctx.pool(), tt).await, 2);
}
