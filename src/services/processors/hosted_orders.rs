//! HTTP client for the hosted checkout processor.
//!
//! # API Shape
//!
//! - `POST /v1/oauth2/token` exchanges client credentials for an access token
//! - `POST /v2/checkout/orders` creates an order; the `approve` (or
//!   `payer-action`) link is where the buyer is sent
//! - `POST /v2/checkout/orders/{id}/capture` captures an approved order
//! - `GET /v2/checkout/orders/{id}` reads an order
//!
//! The local order id travels as both `reference_id` and `custom_id` of the
//! single purchase unit.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    CaptureResult, CaptureStatus, HostedCheckoutProcessor, HostedOrder, ProcessorError,
    format_minor_units,
};

pub struct HostedOrderClient {
    http: reqwest::Client,
    api_base: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<(String, Instant)>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Debug, Deserialize)]
struct Capture {
    status: String,
    #[serde(default)]
    custom_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Payments {
    #[serde(default)]
    captures: Vec<Capture>,
}

#[derive(Debug, Deserialize)]
struct PurchaseUnit {
    #[serde(default)]
    reference_id: Option<String>,
    #[serde(default)]
    custom_id: Option<String>,
    #[serde(default)]
    payments: Option<Payments>,
}

#[derive(Debug, Deserialize)]
struct OrderBody {
    id: String,
    status: String,
    #[serde(default)]
    links: Vec<Link>,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    issue: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

impl OrderBody {
    fn into_capture_result(self) -> CaptureResult {
        let unit = self.purchase_units.into_iter().next();
        let capture_status = unit
            .as_ref()
            .and_then(|u| u.payments.as_ref())
            .and_then(|p| p.captures.first())
            .map(|c| c.status.clone());

        let reference = unit.as_ref().and_then(|u| {
            u.custom_id
                .clone()
                .or_else(|| u.reference_id.clone())
                .or_else(|| {
                    u.payments
                        .as_ref()
                        .and_then(|p| p.captures.first())
                        .and_then(|c| c.custom_id.clone())
                })
        });

        let status = match (self.status.as_str(), capture_status.as_deref()) {
            (_, Some("DECLINED" | "FAILED")) | ("VOIDED", _) => CaptureStatus::Declined,
            ("COMPLETED", Some("COMPLETED")) | ("COMPLETED", None) => CaptureStatus::Completed,
            _ => CaptureStatus::Pending,
        };

        CaptureResult {
            processor_order_id: self.id,
            reference,
            status,
        }
    }
}

impl HostedOrderClient {
    /// Build a client with a 10 second request timeout.
    pub fn new(api_base: &str, client_id: &str, client_secret: &str) -> Result<Self, ProcessorError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            token: Mutex::new(None),
        })
    }

    /// Get a cached access token, refreshing it a minute before expiry.
    async fn access_token(&self) -> Result<String, ProcessorError> {
        let mut cached = self.token.lock().await;
        if let Some((token, expires_at)) = cached.as_ref() {
            if Instant::now() < *expires_at {
                return Ok(token.clone());
            }
        }

        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.api_base))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProcessorError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProcessorError::Decode(e.to_string()))?;

        let lifetime = Duration::from_secs(body.expires_in.saturating_sub(60));
        *cached = Some((body.access_token.clone(), Instant::now() + lifetime));
        Ok(body.access_token)
    }

    async fn get_order(&self, processor_order_id: &str) -> Result<OrderBody, ProcessorError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(format!(
                "{}/v2/checkout/orders/{}",
                self.api_base, processor_order_id
            ))
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProcessorError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| ProcessorError::Decode(e.to_string()))
    }
}

#[async_trait]
impl HostedCheckoutProcessor for HostedOrderClient {
    async fn create_order(
        &self,
        amount_cents: i64,
        currency: &str,
        reference: Uuid,
        return_url: &str,
        cancel_url: &str,
    ) -> Result<HostedOrder, ProcessorError> {
        let token = self.access_token().await?;
        let payload = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": reference.to_string(),
                "custom_id": reference.to_string(),
                "amount": {
                    "currency_code": currency.to_ascii_uppercase(),
                    "value": format_minor_units(amount_cents, currency),
                },
            }],
            "application_context": {
                "return_url": return_url,
                "cancel_url": cancel_url,
                "user_action": "PAY_NOW",
            },
        });

        let response = self
            .http
            .post(format!("{}/v2/checkout/orders", self.api_base))
            .bearer_auth(token)
            .header("PayPal-Request-Id", format!("create-{reference}"))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProcessorError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: OrderBody = response
            .json()
            .await
            .map_err(|e| ProcessorError::Decode(e.to_string()))?;

        let approve_url = body
            .links
            .iter()
            .find(|link| link.rel == "approve" || link.rel == "payer-action")
            .map(|link| link.href.clone())
            .ok_or_else(|| ProcessorError::Decode("order has no approve link".to_string()))?;

        tracing::info!(order_id = %reference, processor_order_id = %body.id, "Hosted order created");

        Ok(HostedOrder {
            id: body.id,
            approve_url,
        })
    }

    async fn capture_order(
        &self,
        processor_order_id: &str,
    ) -> Result<CaptureResult, ProcessorError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.api_base, processor_order_id
            ))
            .bearer_auth(token)
            .header("PayPal-Request-Id", format!("capture-{processor_order_id}"))
            .header("Content-Type", "application/json")
            .body("{}")
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            let text = response.text().await.unwrap_or_default();
            let already_captured = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.details.iter().any(|d| d.issue == "ORDER_ALREADY_CAPTURED"))
                .unwrap_or(false);

            if already_captured {
                tracing::info!(%processor_order_id, "Order already captured, reading result");
                return Ok(self.get_order(processor_order_id).await?.into_capture_result());
            }

            return Err(ProcessorError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        if !status.is_success() {
            return Err(ProcessorError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: OrderBody = response
            .json()
            .await
            .map_err(|e| ProcessorError::Decode(e.to_string()))?;

        Ok(body.into_capture_result())
    }
}
