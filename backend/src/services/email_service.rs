//! Outbound email delivery.
//!
//! The rest of the application only ever sees [`EmailTransport`]; the SMTP
//! implementation is swapped for [`DisabledTransport`] when no relay is configured.

use crate::config::EmailConfig;
use crate::errors::{ServiceError, ServiceResult};
use async_trait::async_trait;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::str::FromStr;
use std::sync::Arc;

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> ServiceResult<()>;
}

/// SMTP delivery through lettre.
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    config: EmailConfig,
}

impl EmailService {
    /// Creates a new EmailService instance
    pub fn new(config: EmailConfig) -> ServiceResult<Self> {
        let creds = Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| ServiceError::internal_error(format!("Invalid SMTP host: {e}")))?
            .port(config.smtp_port)
            .credentials(creds)
            .build();

        Ok(Self { mailer, config })
    }
}

#[async_trait]
impl EmailTransport for EmailService {
    async fn send(&self, to: &str, subject: &str, body: &str) -> ServiceResult<()> {
        let from_mailbox = Mailbox::from_str(&format!(
            "{} <{}>",
            self.config.from_name, self.config.from_email
        ))
        .map_err(|e| ServiceError::internal_error(format!("Invalid from email: {e}")))?;

        let to_mailbox = Mailbox::from_str(to)
            .map_err(|e| ServiceError::internal_error(format!("Invalid recipient email: {e}")))?;

        let email = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| ServiceError::internal_error(format!("Failed to build email: {e}")))?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| ServiceError::internal_error(format!("Failed to send email: {e}")))?;

        Ok(())
    }
}

/// Used when SMTP is not configured: messages are logged and dropped.
pub struct DisabledTransport;

#[async_trait]
impl EmailTransport for DisabledTransport {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> ServiceResult<()> {
        tracing::info!("Email delivery disabled, dropping '{}' for {}", subject, to);
        Ok(())
    }
}

/// Picks the transport matching the configuration.
pub fn transport_from_config(
    config: Option<&EmailConfig>,
) -> ServiceResult<Arc<dyn EmailTransport>> {
    match config {
        Some(email) => Ok(Arc::new(EmailService::new(email.clone())?)),
        None => Ok(Arc::new(DisabledTransport)),
    }
}
