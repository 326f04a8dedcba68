//! Mail transport: the abstract "send one message" capability.
//!
//! `HttpMailTransport` talks to a JSON mail API (Resend/Postmark style).
//! `LogTransport` is used when no mail API is configured; it only logs.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::delivery::state::FailureKind;

/// A fully rendered message ready for hand-off.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: FailureKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Hands one message to the transport and returns the provider message id.
    async fn send(&self, email: &OutboundEmail) -> Result<String, TransportError>;
}

/// Structural address check. Anything failing this is a permanent error and
/// never reaches the transport.
pub fn is_valid_address(address: &str) -> bool {
    let address = address.trim();
    if address.is_empty() || address.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

// ────────────────────────────────────────────────────────────────────────────
// HTTP mail API
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

#[derive(Clone)]
pub struct HttpMailTransport {
    client: Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl HttpMailTransport {
    pub fn new(endpoint: String, api_key: String, from: String) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().build()?,
            endpoint,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<String, TransportError> {
        let body = SendRequest {
            from: &self.from,
            to: [&email.to],
            subject: &email.subject,
            text: &email.body,
            reply_to: email.reply_to.as_deref(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), text));
        }

        let parsed: SendResponse = response.json().await.map_err(|e| {
            TransportError::new(
                FailureKind::TransportUnavailable,
                format!("unreadable mail API response: {e}"),
            )
        })?;
        debug!("Mail API accepted message {} for {}", parsed.id, email.to);
        Ok(parsed.id)
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> TransportError {
    let kind = if e.is_timeout() {
        FailureKind::Timeout
    } else {
        FailureKind::Connection
    };
    TransportError::new(kind, e.to_string())
}

/// 429 and 5xx are worth retrying; any other non-success is a hard rejection.
fn classify_status(status: u16, body: String) -> TransportError {
    let kind = if status == 429 || (500..600).contains(&status) {
        FailureKind::TransportUnavailable
    } else {
        FailureKind::Rejected
    };
    TransportError::new(kind, format!("mail API returned {status}: {body}"))
}

// ────────────────────────────────────────────────────────────────────────────
// Log-only transport
// ────────────────────────────────────────────────────────────────────────────

pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<String, TransportError> {
        let id = format!("log-{}", Uuid::new_v4());
        info!(
            "[log transport] to={} subject={:?} ({} bytes) id={}",
            email.to,
            email.subject,
            email.body.len(),
            id
        );
        Ok(id)
    }
}
