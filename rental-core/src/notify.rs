use async_trait::async_trait;
use rental_order::SaleOrder;
use rental_shared::Masked;
use serde::Serialize;
use tracing::{error, info};

use crate::identity::User;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub to: Masked<String>,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    pub fn new(to: &str, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: Masked(to.to_string()),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Invalid address: {0}")]
    Address(String),
    #[error("Mail transport failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

/// Send `message`, falling back to the log when the mailer fails.
/// Returns whether the mailer accepted the message.
pub async fn deliver(mailer: &dyn Mailer, message: &EmailMessage) -> bool {
    match mailer.send(message).await {
        Ok(()) => {
            info!("Email '{}' sent to {}", message.subject, message.to);
            true
        }
        Err(e) => {
            error!("Failed to send email '{}' to {}: {}", message.subject, message.to, e);
            info!(
                "Undelivered email to {}\nSubject: {}\n\n{}",
                message.to, message.subject, message.body
            );
            false
        }
    }
}

pub fn verification_email(user: &User, verify_url: &str) -> EmailMessage {
    let token = user.verification_token.as_deref().unwrap_or_default();
    EmailMessage::new(
        &user.email,
        "Verify your email address",
        format!(
            "Hi {},\n\nPlease confirm your email address by opening the link below:\n\n{}?token={}\n\nIf you did not sign up, ignore this message.",
            user.name, verify_url, token
        ),
    )
}

pub fn welcome_email(user: &User) -> EmailMessage {
    EmailMessage::new(
        &user.email,
        "Welcome to the rental marketplace",
        format!(
            "Hi {},\n\nYour email is verified and your {} account is ready.",
            user.name,
            user.role.as_str().to_lowercase()
        ),
    )
}

pub fn order_confirmed_email(order: &SaleOrder, customer: &User) -> EmailMessage {
    EmailMessage::new(
        &customer.email,
        format!("Order {} confirmed", order.number),
        format!(
            "Hi {},\n\nYour rental {} is confirmed for {} to {}.\nTotal: {}",
            customer.name,
            order.number,
            order.start_date.format("%Y-%m-%d %H:%M UTC"),
            order.end_date.format("%Y-%m-%d %H:%M UTC"),
            format_cents(order.total_amount_cents)
        ),
    )
}

pub fn expiry_reminder_email(order: &SaleOrder, customer: &User) -> EmailMessage {
    EmailMessage::new(
        &customer.email,
        format!("Rental {} ends soon", order.number),
        format!(
            "Hi {},\n\nYour rental {} ends at {}. Please return the items on time to avoid late fees.",
            customer.name,
            order.number,
            order.end_date.format("%Y-%m-%d %H:%M UTC")
        ),
    )
}

pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    format!("{}{}.{:02}", sign, cents.abs() / 100, cents.abs() % 100)
}
