//! Mail Dispatcher: the single choke point for outbound email.
//!
//! Each `send` is self-contained: it validates the address, makes up to
//! `max_attempts` transport calls with exponential backoff between them, and
//! always returns a terminal `DeliveryAttempt`. It never returns an error, so
//! one recipient cannot abort its siblings.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::delivery::state::{DeliveryStatus, FailureKind};
use crate::delivery::transport::{is_valid_address, MailTransport, OutboundEmail, TransportError};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: u32,
    pub max_delay: Duration,
    /// Upper bound on a single transport call.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            factor: 2,
            max_delay: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt after `completed` attempts have failed:
    /// base * factor^(completed-1), capped at `max_delay`.
    pub fn backoff(&self, completed: u32) -> Duration {
        let exponent = completed.saturating_sub(1);
        let multiplier = self.factor.saturating_pow(exponent);
        self.base_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent,
    Failed,
}

impl DeliveryOutcome {
    pub fn status(self) -> DeliveryStatus {
        match self {
            DeliveryOutcome::Sent => DeliveryStatus::Sent,
            DeliveryOutcome::Failed => DeliveryStatus::Failed,
        }
    }
}

/// Terminal record of one dispatch sequence to one recipient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryAttempt {
    pub recipient: String,
    pub outcome: DeliveryOutcome,
    /// Transport calls made. Zero when the message never left the process.
    pub attempts: u32,
    pub message_id: Option<String>,
    pub last_error: Option<FailureKind>,
    pub last_error_message: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl DeliveryAttempt {
    /// A failure decided before any transport call (bad address, no recipient).
    pub fn rejected_locally(recipient: &str, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            recipient: recipient.to_string(),
            outcome: DeliveryOutcome::Failed,
            attempts: 0,
            message_id: None,
            last_error: Some(kind),
            last_error_message: Some(message.into()),
            last_attempt_at: None,
        }
    }
}

pub struct MailDispatcher {
    transport: Arc<dyn MailTransport>,
    policy: RetryPolicy,
}

impl MailDispatcher {
    pub fn new(transport: Arc<dyn MailTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn send(&self, email: &OutboundEmail) -> DeliveryAttempt {
        if !is_valid_address(&email.to) {
            warn!("Refusing to send to malformed address {:?}", email.to);
            return DeliveryAttempt::rejected_locally(
                &email.to,
                FailureKind::InvalidAddress,
                format!("'{}' is not a valid email address", email.to),
            );
        }

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            let result = match tokio::time::timeout(
                self.policy.attempt_timeout,
                self.transport.send(email),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::new(
                    FailureKind::Timeout,
                    format!(
                        "no response within {}ms",
                        self.policy.attempt_timeout.as_millis()
                    ),
                )),
            };
            let attempted_at = Utc::now();

            match result {
                Ok(message_id) => {
                    info!(
                        "Delivered to {} after {} attempt(s), message id {}",
                        email.to, attempts, message_id
                    );
                    return DeliveryAttempt {
                        recipient: email.to.clone(),
                        outcome: DeliveryOutcome::Sent,
                        attempts,
                        message_id: Some(message_id),
                        last_error: None,
                        last_error_message: None,
                        last_attempt_at: Some(attempted_at),
                    };
                }
                Err(err) if err.kind.is_transient() && attempts < max_attempts => {
                    let delay = self.policy.backoff(attempts);
                    warn!(
                        "Send to {} failed (attempt {}/{}): {}; retrying in {}ms",
                        email.to,
                        attempts,
                        max_attempts,
                        err,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    warn!(
                        "Giving up on {} after {} attempt(s): {}",
                        email.to, attempts, err
                    );
                    return DeliveryAttempt {
                        recipient: email.to.clone(),
                        outcome: DeliveryOutcome::Failed,
                        attempts,
                        message_id: None,
                        last_error: Some(err.kind),
                        last_error_message: Some(err.message),
                        last_attempt_at: Some(attempted_at),
                    };
                }
            }
        }
    }
}
