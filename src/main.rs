//! Ticketing Server - Main Application Entry Point
//!
//! A REST API server for selling event tickets against finite inventory,
//! confirming payments from two processors and checking tickets in at the door.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Build processor clients and the mailer
//! 5. Start the in-process reaper if an interval is configured
//! 6. Build HTTP router with routes and middleware
//! 7. Start server on configured port

use std::{sync::Arc, time::Duration};

use tracing_subscriber::EnvFilter;

use ticketing_server::{
    build_router,
    config::Config,
    db,
    middleware::auth::StaffRoleAuthorizer,
    services::{
        notification_service::{LogMailer, Mailer, SmtpConfig, SmtpMailer},
        processors::{card_intents::CardIntentClient, hosted_orders::HostedOrderClient},
        reaper_service,
    },
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    config.validate_urls()?;
    let reservation_ttl = reaper_service::ttl_from_minutes(config.reservation_ttl_minutes)?;
    tracing::info!("Configuration loaded");

    // Create database pool
    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let intents = CardIntentClient::new(
        &config.card_intents_api_base,
        &config.card_intents_secret_key,
    )?;
    let hosted = HostedOrderClient::new(
        &config.hosted_orders_api_base,
        &config.hosted_orders_client_id,
        &config.hosted_orders_client_secret,
    )?;

    let mailer: Arc<dyn Mailer> = match SmtpConfig::from_env() {
        Some(smtp) => {
            tracing::info!(host = %smtp.host, "SMTP mailer configured");
            Arc::new(SmtpMailer::new(smtp)?)
        }
        None => {
            tracing::warn!("SMTP_HOST not set, ticket emails will only be logged");
            Arc::new(LogMailer)
        }
    };

    if config.reaper_interval_secs > 0 {
        reaper_service::spawn_reaper(
            pool.clone(),
            reservation_ttl,
            Duration::from_secs(config.reaper_interval_secs),
        );
        tracing::info!(
            interval_secs = config.reaper_interval_secs,
            ttl_minutes = config.reservation_ttl_minutes,
            "Reaper started"
        );
    }

    let addr = format!("0.0.0.0:{}", config.server_port);

    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config),
        intents: Arc::new(intents),
        hosted: Arc::new(hosted),
        mailer,
        authorizer: Arc::new(StaffRoleAuthorizer::new(pool)),
    };

    let app = build_router(state);

    // Bind to network address and start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
