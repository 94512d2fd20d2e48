//! Ticketing server library.
//!
//! The order and inventory core of an event ticketing service: reserving
//! finite ticket inventory, taking payment through one of two processors,
//! issuing tickets exactly once, reaping abandoned reservations and
//! checking tickets in at the door.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (transactions, row locks, conditional updates)
//! - **Payments**: two processor clients behind traits, called with reqwest
//! - **Authentication**: staff keys with SHA-256 hashing, for check-in only
//! - **Format**: JSON requests/responses

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the HTTP router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Staff routes: rate limited per address, authenticated, then rate limited per actor
    let staff_routes = Router::new()
        .route("/api/v1/check-in", post(handlers::check_in::check_in))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit_middleware,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::ip_rate_limit_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        // Catalog
        .route(
            "/api/v1/events/{event_id}/ticket-types",
            get(handlers::events::list_ticket_types),
        )
        // Checkout
        .route(
            "/api/v1/checkout/intent",
            post(handlers::orders::create_intent_checkout),
        )
        .route(
            "/api/v1/checkout/hosted",
            post(handlers::orders::create_hosted_checkout),
        )
        .route(
            "/api/v1/checkout/hosted/return",
            get(handlers::payments::hosted_return),
        )
        .route(
            "/api/v1/checkout/hosted/cancel",
            get(handlers::payments::hosted_cancel),
        )
        // Orders
        .route("/api/v1/orders/{id}", get(handlers::orders::get_order))
        .route(
            "/api/v1/orders/{id}/intent-sync",
            post(handlers::orders::sync_intent),
        )
        // Processor webhooks (signature verified in the handler)
        .route(
            "/api/v1/webhooks/card-intents",
            post(handlers::payments::card_intents_webhook),
        )
        .route(
            "/api/v1/webhooks/hosted-orders",
            post(handlers::payments::hosted_orders_webhook),
        )
        // Reaper (shared secret checked in the handler)
        .route("/api/v1/reaper/sweep", post(handlers::reaper::sweep))
        .merge(staff_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
