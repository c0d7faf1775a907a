use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::MailerConfig;
use crate::error::{Result, RosterError};

/// Plain-text e-mail ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Writes messages to the log instead of sending them. Used when no mail
/// API key is configured.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl EmailSender for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        tracing::info!(
            to = ?message.to,
            subject = %message.subject,
            text = %message.text,
            "Mail delivery disabled, message logged"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    text: &'a str,
}

/// Delivers mail through a Resend-compatible HTTP API (`POST /emails`).
#[derive(Debug, Clone)]
pub struct ResendMailer {
    http: reqwest::Client,
    config: MailerConfig,
}

impl ResendMailer {
    pub fn new(config: MailerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/emails", self.config.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl EmailSender for ResendMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        if message.to.is_empty() {
            return Err(RosterError::Mail("no recipients".to_string()));
        }

        tracing::info!(to = ?message.to, subject = %message.subject, "Sending e-mail");

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&SendRequest {
                from: &self.config.from,
                to: &message.to,
                subject: &message.subject,
                text: &message.text,
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| status.canonical_reason().unwrap_or_default().to_string());
        tracing::error!(status = status.as_u16(), body = %body, "Mail API rejected message");
        Err(RosterError::Mail(format!("{} {}", status.as_u16(), body)))
    }
}
