//! Shared fixtures for integration tests.
//!
//! Every test gets a fresh database from `#[sqlx::test]`; these helpers seed
//! it and build an `AppState` wired to in-memory fake processors and a
//! recording mailer.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

use ticketing_server::build_router;
use ticketing_server::config::Config;
use ticketing_server::middleware::auth::{StaffRoleAuthorizer, hash_key};
use ticketing_server::models::order::{CreateOrderRequest, Order, OrderLineRequest, OrderStatus};
use ticketing_server::models::ticket::Ticket;
use ticketing_server::services::notification_service::{Mailer, NotificationError, OutgoingEmail};
use ticketing_server::services::order_service;
use ticketing_server::services::processors::{
    CaptureResult, CaptureStatus, HostedCheckoutProcessor, HostedOrder, IntentProcessor,
    IntentStatus, PaymentIntent, ProcessorError,
};
use ticketing_server::state::AppState;

pub const INTENT_WEBHOOK_SECRET: &str = "whsec_intents_test";
pub const HOSTED_WEBHOOK_SECRET: &str = "whsec_hosted_test";
pub const REAPER_SECRET: &str = "reaper-secret-test";

// ---------------------------------------------------------------------------
// Fake processors
// ---------------------------------------------------------------------------

/// In-memory card intent processor.
#[derive(Default)]
pub struct FakeIntents {
    intents: Mutex<HashMap<String, PaymentIntent>>,
    next_id: AtomicUsize,
    pub fail_create: AtomicBool,
    pub canceled: Mutex<Vec<String>>,
}

impl FakeIntents {
    /// Simulate the processor moving an intent to a new state.
    pub fn set_status(&self, intent_id: &str, status: IntentStatus, declined: bool) {
        let mut intents = self.intents.lock().unwrap();
        let intent = intents.get_mut(intent_id).expect("intent exists");
        intent.status = status;
        intent.last_payment_error = declined.then(|| serde_json::json!({ "code": "card_declined" }));
    }

    pub fn get(&self, intent_id: &str) -> PaymentIntent {
        self.intents.lock().unwrap()[intent_id].clone()
    }
}

#[async_trait]
impl IntentProcessor for FakeIntents {
    async fn create_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        order_id: Uuid,
    ) -> Result<PaymentIntent, ProcessorError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ProcessorError::Api {
                status: 503,
                message: "processor unavailable".to_string(),
            });
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("pi_test_{n}");
        let intent = PaymentIntent {
            id: id.clone(),
            client_secret: Some(format!("{id}_secret")),
            status: IntentStatus::RequiresPaymentMethod,
            amount: amount_cents,
            currency: currency.to_ascii_lowercase(),
            metadata: HashMap::from([("order_id".to_string(), order_id.to_string())]),
            last_payment_error: None,
        };
        self.intents.lock().unwrap().insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, ProcessorError> {
        self.intents
            .lock()
            .unwrap()
            .get(intent_id)
            .cloned()
            .ok_or(ProcessorError::Api {
                status: 404,
                message: "no such intent".to_string(),
            })
    }

    async fn cancel_intent(&self, intent_id: &str) -> Result<(), ProcessorError> {
        if let Some(intent) = self.intents.lock().unwrap().get_mut(intent_id) {
            intent.status = IntentStatus::Canceled;
        }
        self.canceled.lock().unwrap().push(intent_id.to_string());
        Ok(())
    }
}

struct FakeHostedOrder {
    reference: String,
    capture_status: CaptureStatus,
}

/// In-memory hosted checkout processor. Captures complete unless told otherwise.
#[derive(Default)]
pub struct FakeHosted {
    orders: Mutex<HashMap<String, FakeHostedOrder>>,
    next_id: AtomicUsize,
    pub capture_calls: AtomicUsize,
}

impl FakeHosted {
    pub fn set_capture_status(&self, processor_order_id: &str, status: CaptureStatus) {
        let mut orders = self.orders.lock().unwrap();
        orders.get_mut(processor_order_id).expect("order exists").capture_status = status;
    }

    /// Make the processor echo back a different correlation id.
    pub fn set_reference(&self, processor_order_id: &str, reference: &str) {
        let mut orders = self.orders.lock().unwrap();
        orders.get_mut(processor_order_id).expect("order exists").reference = reference.to_string();
    }
}

#[async_trait]
impl HostedCheckoutProcessor for FakeHosted {
    async fn create_order(
        &self,
        _amount_cents: i64,
        _currency: &str,
        reference: Uuid,
        _return_url: &str,
        _cancel_url: &str,
    ) -> Result<HostedOrder, ProcessorError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("HO-TEST-{n}");
        self.orders.lock().unwrap().insert(
            id.clone(),
            FakeHostedOrder {
                reference: reference.to_string(),
                capture_status: CaptureStatus::Completed,
            },
        );
        Ok(HostedOrder {
            approve_url: format!("https://hosted.test/checkoutnow?token={id}"),
            id,
        })
    }

    async fn capture_order(
        &self,
        processor_order_id: &str,
    ) -> Result<CaptureResult, ProcessorError> {
        self.capture_calls.fetch_add(1, Ordering::SeqCst);
        let orders = self.orders.lock().unwrap();
        let order = orders.get(processor_order_id).ok_or(ProcessorError::Api {
            status: 404,
            message: "no such order".to_string(),
        })?;
        Ok(CaptureResult {
            processor_order_id: processor_order_id.to_string(),
            reference: Some(order.reference.clone()),
            status: order.capture_status,
        })
    }
}

/// Mailer that keeps every email it is asked to send.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
}

impl RecordingMailer {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Emails are sent from a spawned task; wait for at least `n` of them.
    pub async fn wait_for(&self, n: usize) -> usize {
        for _ in 0..100 {
            if self.count() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.count()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

pub struct TestContext {
    pub state: AppState,
    pub intents: Arc<FakeIntents>,
    pub hosted: Arc<FakeHosted>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestContext {
    pub fn pool(&self) -> &PgPool {
        &self.state.pool
    }

    pub fn app(&self) -> Router {
        build_router(self.state.clone())
    }
}

/// Build a `Config` with test secrets, plus any overrides.
pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut pairs: Vec<(String, String)> = [
        ("DATABASE_URL", "postgres://unused"),
        ("PUBLIC_BASE_URL", "https://tickets.test"),
        ("REAPER_SECRET", REAPER_SECRET),
        ("CARD_INTENTS_SECRET_KEY", "sk_test"),
        ("CARD_INTENTS_WEBHOOK_SECRET", INTENT_WEBHOOK_SECRET),
        ("HOSTED_ORDERS_CLIENT_ID", "client"),
        ("HOSTED_ORDERS_CLIENT_SECRET", "secret"),
        ("HOSTED_ORDERS_WEBHOOK_SECRET", HOSTED_WEBHOOK_SECRET),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    pairs.extend(overrides.iter().map(|(k, v)| (k.to_string(), v.to_string())));

    Config::from_pairs(pairs).expect("test config is valid")
}

pub fn test_context(pool: PgPool) -> TestContext {
    test_context_with(pool, &[])
}

pub fn test_context_with(pool: PgPool, overrides: &[(&str, &str)]) -> TestContext {
    let intents = Arc::new(FakeIntents::default());
    let hosted = Arc::new(FakeHosted::default());
    let mailer = Arc::new(RecordingMailer::default());

    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(test_config(overrides)),
        intents: intents.clone(),
        hosted: hosted.clone(),
        mailer: mailer.clone(),
        authorizer: Arc::new(StaffRoleAuthorizer::new(pool)),
    };

    TestContext {
        state,
        intents,
        hosted,
        mailer,
    }
}

// ---------------------------------------------------------------------------
// Seed data
// ---------------------------------------------------------------------------

pub async fn seed_event(pool: &PgPool) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO events (name, starts_at) VALUES ('Launch Party', NOW() + INTERVAL '7 days') RETURNING id",
    )
    .fetch_one(pool)
    .await
    .expect("insert event")
}

pub async fn seed_ticket_type(
    pool: &PgPool,
    event_id: Uuid,
    quantity_total: i32,
    price_cents: i64,
    currency: &str,
) -> Uuid {
    sqlx::query_scalar(
        r#"
        INSERT INTO ticket_types (event_id, name, price_cents, currency, quantity_total)
        VALUES ($1, 'General', $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(event_id)
    .bind(price_cents)
    .bind(currency)
    .bind(quantity_total)
    .fetch_one(pool)
    .await
    .expect("insert ticket type")
}

pub async fn quantity_sold(pool: &PgPool, ticket_type_id: Uuid) -> i32 {
    sqlx::query_scalar("SELECT quantity_sold FROM ticket_types WHERE id = $1")
        .bind(ticket_type_id)
        .fetch_one(pool)
        .await
        .expect("ticket type exists")
}

pub async fn order_status(pool: &PgPool, order_id: Uuid) -> OrderStatus {
    sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_one(pool)
        .await
        .expect("order exists")
}

pub async fn ticket_count(pool: &PgPool, order_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE order_id = $1")
        .bind(order_id)
        .fetch_one(pool)
        .await
        .expect("count tickets")
}

pub async fn order_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(pool)
        .await
        .expect("count orders")
}

/// Move an order's creation time into the past.
pub async fn backdate_order(pool: &PgPool, order_id: Uuid, minutes: i64) {
    sqlx::query("UPDATE orders SET created_at = NOW() - make_interval(mins => $2::INT) WHERE id = $1")
        .bind(order_id)
        .bind(minutes as i32)
        .execute(pool)
        .await
        .expect("backdate order");
}

/// Create a staff key with `role`; returns `(raw key, staff key id)`.
pub async fn seed_staff(pool: &PgPool, role: &str) -> (String, Uuid) {
    let raw_key = format!("sk_staff_{}", Uuid::new_v4().simple());
    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO staff_keys (key_hash, display_name, role) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(hash_key(&raw_key))
    .bind(format!("{role} key"))
    .bind(role)
    .fetch_one(pool)
    .await
    .expect("insert staff key");
    (raw_key, id)
}

/// Create a guest list entry; returns its token.
pub async fn seed_guest(pool: &PgPool, event_id: Uuid, token: &str) -> String {
    sqlx::query(
        "INSERT INTO guest_list_entries (event_id, guest_email, guest_name, token) VALUES ($1, $2, 'Guest', $3)",
    )
    .bind(event_id)
    .bind(format!("{}@guests.test", Uuid::new_v4().simple()))
    .bind(token)
    .execute(pool)
    .await
    .expect("insert guest");
    token.to_string()
}

pub fn order_request(event_id: Uuid, lines: &[(Uuid, i32)]) -> CreateOrderRequest {
    CreateOrderRequest {
        event_id,
        buyer_email: "ada@example.com".to_string(),
        buyer_name: Some("Ada".to_string()),
        items: lines
            .iter()
            .map(|(ticket_type_id, quantity)| OrderLineRequest {
                ticket_type_id: *ticket_type_id,
                quantity: *quantity,
            })
            .collect(),
    }
}

/// Create a pending order directly (no processor involved).
pub async fn create_pending_order(pool: &PgPool, request: &CreateOrderRequest) -> Order {
    let mut tx = pool.begin().await.expect("begin");
    let order = order_service::create_order(&mut tx, Uuid::new_v4(), request)
        .await
        .expect("order created");
    tx.commit().await.expect("commit");
    order
}

/// Create an order for `quantity` tickets and mark it paid.
pub async fn create_paid_order(
    pool: &PgPool,
    event_id: Uuid,
    ticket_type_id: Uuid,
    quantity: i32,
) -> (Order, Vec<Ticket>) {
    let order = create_pending_order(pool, &order_request(event_id, &[(ticket_type_id, quantity)])).await;
    let paid = order_service::transition_to_paid(pool, order.id)
        .await
        .expect("paid transition");
    (paid.order, paid.tickets)
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.expect("router is infallible")
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::post(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    key: &str,
    body: serde_json::Value,
) -> Response<Body> {
    let request = Request::post(uri)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {key}"))
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

/// POST a raw body with one extra header (webhooks).
pub async fn post_signed(
    app: Router,
    uri: &str,
    header: (&str, &str),
    body: &[u8],
) -> Response<Body> {
    let request = Request::post(uri)
        .header("Content-Type", "application/json")
        .header(header.0, header.1)
        .body(Body::from(body.to_vec()))
        .unwrap();
    send(app, request).await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body is JSON")
}

pub fn assert_status(response: &Response<Body>, expected: StatusCode) {
    assert_eq!(response.status(), expected, "unexpected status");
}
