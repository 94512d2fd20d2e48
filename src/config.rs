//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `REAPER_SECRET` (required): shared secret for the reaper endpoint
/// - `CARD_INTENTS_*` (required): card intent processor credentials
/// - `HOSTED_ORDERS_*` (required): hosted checkout processor credentials
///
/// SMTP settings are read separately by [`crate::services::notification_service::SmtpConfig`].
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    /// Base URL used for redemption links and processor return URLs.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    pub reaper_secret: String,

    /// Default age after which a pending order is considered abandoned.
    #[serde(default = "default_reservation_ttl")]
    pub reservation_ttl_minutes: i64,

    /// Interval for the in-process reaper. 0 disables it.
    #[serde(default)]
    pub reaper_interval_secs: u64,

    #[serde(default = "default_card_intents_api_base")]
    pub card_intents_api_base: String,
    pub card_intents_secret_key: String,
    pub card_intents_webhook_secret: String,

    #[serde(default = "default_hosted_orders_api_base")]
    pub hosted_orders_api_base: String,
    pub hosted_orders_client_id: String,
    pub hosted_orders_client_secret: String,
    pub hosted_orders_webhook_secret: String,

    /// Check-in requests allowed per key per window.
    #[serde(default = "default_check_in_rate_limit")]
    pub check_in_rate_limit: i32,

    /// Check-in requests allowed per client address per window, counted
    /// before authentication.
    #[serde(default = "default_check_in_ip_rate_limit")]
    pub check_in_ip_rate_limit: i32,

    #[serde(default = "default_check_in_rate_window")]
    pub check_in_rate_window_secs: i64,
}

fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    10
}

fn default_public_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_reservation_ttl() -> i64 {
    30
}

fn default_card_intents_api_base() -> String {
    "https://api.stripe.com".to_string()
}

fn default_hosted_orders_api_base() -> String {
    "https://api-m.sandbox.paypal.com".to_string()
}

fn default_check_in_rate_limit() -> i32 {
    60
}

fn default_check_in_ip_rate_limit() -> i32 {
    300
}

fn default_check_in_rate_window() -> i64 {
    60
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();

        envy::from_env::<Config>()
    }

    /// Load configuration from an explicit list of key/value pairs.
    ///
    /// Used by tests and tooling that must not depend on the process environment.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter::<_, Config>(pairs)
    }

    /// Check that every configured base URL parses as an absolute URL.
    ///
    /// Called once at startup so a typo fails fast instead of on the first
    /// processor call or email.
    pub fn validate_urls(&self) -> Result<(), url::ParseError> {
        for base in [
            &self.public_base_url,
            &self.card_intents_api_base,
            &self.hosted_orders_api_base,
        ] {
            url::Url::parse(base)?;
        }
        Ok(())
    }

    /// Link a buyer follows to present a ticket or guest pass.
    pub fn redemption_link(&self, token: &str) -> String {
        format!("{}/t/{}", self.public_base_url.trim_end_matches('/'), token)
    }

    /// Return and cancel URLs handed to the hosted checkout processor.
    pub fn hosted_return_urls(&self) -> (String, String) {
        let base = self.public_base_url.trim_end_matches('/');
        (
            format!("{base}/api/v1/checkout/hosted/return"),
            format!("{base}/api/v1/checkout/hosted/cancel"),
        )
    }
}
