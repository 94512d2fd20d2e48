//! HTTP client for the card intent processor.
//!
//! # API Shape
//!
//! - `POST /v1/payment_intents` (form encoded) creates an intent
//! - `GET /v1/payment_intents/{id}` retrieves one
//! - `POST /v1/payment_intents/{id}/cancel` cancels one
//!
//! Requests authenticate with the secret key as a Bearer token. Creation
//! sends `Idempotency-Key: <order id>` so a retried request for the same
//! order never opens a second intent.

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use super::{IntentProcessor, PaymentIntent, ProcessorError};

pub struct CardIntentClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl CardIntentClient {
    /// Build a client with a 10 second request timeout.
    pub fn new(api_base: &str, secret_key: &str) -> Result<Self, ProcessorError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    async fn parse(response: reqwest::Response) -> Result<PaymentIntent, ProcessorError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProcessorError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<PaymentIntent>()
            .await
            .map_err(|e| ProcessorError::Decode(e.to_string()))
    }
}

#[async_trait]
impl IntentProcessor for CardIntentClient {
    async fn create_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        order_id: Uuid,
    ) -> Result<PaymentIntent, ProcessorError> {
        let order_id = order_id.to_string();
        let amount = amount_cents.to_string();
        let currency = currency.to_ascii_lowercase();
        let form = [
            ("amount", amount.as_str()),
            ("currency", currency.as_str()),
            ("metadata[order_id]", order_id.as_str()),
            ("automatic_payment_methods[enabled]", "true"),
        ];

        let response = self
            .http
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", &order_id)
            .form(&form)
            .send()
            .await?;

        let intent = Self::parse(response).await?;
        tracing::info!(%order_id, intent_id = %intent.id, "Payment intent created");
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, ProcessorError> {
        let response = self
            .http
            .get(format!("{}/v1/payment_intents/{}", self.api_base, intent_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        Self::parse(response).await
    }

    async fn cancel_intent(&self, intent_id: &str) -> Result<(), ProcessorError> {
        let response = self
            .http
            .post(format!(
                "{}/v1/payment_intents/{}/cancel",
                self.api_base, intent_id
            ))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        Self::parse(response).await?;
        tracing::info!(%intent_id, "Payment intent canceled");
        Ok(())
    }
}
