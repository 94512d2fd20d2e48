//! Buyer notifications - best-effort ticket emails.
//!
//! Emails are sent on a spawned task after the paid transition has
//! committed. A delivery failure is logged and dropped: it never retries
//! or rolls back the transition or the issuance that preceded it.
//!
//! [`SmtpMailer`] wraps the `lettre` async SMTP transport. When `SMTP_HOST`
//! is not set, [`LogMailer`] is used instead and only logs what it would send.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType, transport::smtp::authentication::Credentials,
};
use std::sync::Arc;

use crate::{
    config::Config,
    models::{order::Order, ticket::Ticket},
};

/// Error type for email delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Email build error: {0}")]
    Build(String),
}

/// A rendered email ready to hand to a mailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Anything that can deliver an [`OutgoingEmail`].
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), NotificationError>;
}

const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_FROM_ADDRESS: &str = "tickets@localhost";

/// SMTP settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub from_address: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl SmtpConfig {
    /// Returns `None` if `SMTP_HOST` is not set.
    ///
    /// | Variable        | Required | Default              |
    /// |-----------------|----------|----------------------|
    /// | `SMTP_HOST`     | yes      | -                    |
    /// | `SMTP_PORT`     | no       | `587`                |
    /// | `SMTP_FROM`     | no       | `tickets@localhost`  |
    /// | `SMTP_USER`     | no       | -                    |
    /// | `SMTP_PASSWORD` | no       | -                    |
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("SMTP_HOST").ok()?;
        Some(Self {
            host,
            port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            user: std::env::var("SMTP_USER").ok(),
            password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }
}

pub struct SmtpMailer {
    from_address: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Result<Self, NotificationError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port);

        if let (Some(user), Some(pass)) = (config.user, config.password) {
            builder = builder.credentials(Credentials::new(user, pass));
        }

        Ok(Self {
            from_address: config.from_address,
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), NotificationError> {
        let message = Message::builder()
            .from(self.from_address.parse()?)
            .to(email.to.parse()?)
            .subject(email.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(email.body)
            .map_err(|e| NotificationError::Build(e.to_string()))?;

        self.transport.send(message).await?;
        tracing::info!(to = %email.to, "Email sent");
        Ok(())
    }
}

/// Mailer used when SMTP is not configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), NotificationError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            "SMTP not configured, email not sent"
        );
        Ok(())
    }
}

/// Build the ticket email for a paid order.
///
/// One redemption link per ticket; each link is the payload the ticket's
/// QR code encodes.
pub fn ticket_email(config: &Config, order: &Order, tickets: &[Ticket]) -> OutgoingEmail {
    let mut body = String::new();
    if let Some(name) = &order.buyer_name {
        body.push_str(&format!("Hi {name},\n\n"));
    }
    body.push_str(&format!(
        "Your order {} is confirmed. Show one code per guest at the door:\n\n",
        order.id
    ));
    for (index, ticket) in tickets.iter().enumerate() {
        body.push_str(&format!(
            "Ticket {}: {}\n",
            index + 1,
            config.redemption_link(&ticket.token)
        ));
    }

    OutgoingEmail {
        to: order.buyer_email.clone(),
        subject: format!("Your tickets ({})", tickets.len()),
        body,
    }
}

/// Send the ticket email on a background task.
///
/// Does nothing when `tickets` is empty (issuance was skipped as already applied).
pub fn dispatch_ticket_email(
    mailer: Arc<dyn Mailer>,
    config: &Config,
    order: &Order,
    tickets: &[Ticket],
) {
    if tickets.is_empty() {
        return;
    }

    let email = ticket_email(config, order, tickets);
    let order_id = order.id;
    tokio::spawn(async move {
        if let Err(e) = mailer.send(email).await {
            tracing::error!(%order_id, error = %e, "Failed to send ticket email");
        }
    });
}
