//! Shared application state.

use axum::extract::FromRef;
use std::sync::Arc;

use crate::{
    config::Config,
    db::DbPool,
    middleware::auth::Authorizer,
    services::{
        notification_service::Mailer,
        processors::{HostedCheckoutProcessor, IntentProcessor},
    },
};

/// State available to all handlers via `State<AppState>`.
///
/// Cheap to clone: everything is a pool handle or behind an `Arc`.
/// Collaborators are trait objects so tests can substitute fakes.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<Config>,
    pub intents: Arc<dyn IntentProcessor>,
    pub hosted: Arc<dyn HostedCheckoutProcessor>,
    pub mailer: Arc<dyn Mailer>,
    pub authorizer: Arc<dyn Authorizer>,
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}
