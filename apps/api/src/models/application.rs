use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::delivery::dispatcher::{DeliveryAttempt, DeliveryOutcome};
use crate::delivery::state::{DeliveryStatus, FailureKind, TransitionError};
use crate::models::job::JobSnapshot;

/// One application of a resume to a job.
///
/// Status only changes through the delivery state machine. A failed
/// application is never reopened; a retry produces a new record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub user_id: String,
    pub resume_id: Uuid,
    pub job_id: String,
    pub job: Option<JobSnapshot>,
    pub status: DeliveryStatus,
    pub email_sent: bool,
    pub email_id: Option<String>,
    pub cover_letter_id: Option<Uuid>,
    pub error_kind: Option<FailureKind>,
    pub error_message: Option<String>,
    pub attempts: u32,
    pub application_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn pending(id: Uuid, user_id: &str, resume_id: Uuid, job_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id: user_id.to_string(),
            resume_id,
            job_id: job_id.to_string(),
            job: None,
            status: DeliveryStatus::Pending,
            email_sent: false,
            email_id: None,
            cover_letter_id: None,
            error_kind: None,
            error_message: None,
            attempts: 0,
            application_date: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status != DeliveryStatus::Failed
    }

    pub fn transition(&mut self, next: DeliveryStatus) -> Result<(), TransitionError> {
        self.status = self.status.transition(next)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Fails the unit before anything was sent.
    pub fn fail(&mut self, kind: FailureKind, message: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(DeliveryStatus::Failed)?;
        self.error_kind = Some(kind);
        self.error_message = Some(message.into());
        Ok(())
    }

    /// Applies the dispatcher's terminal outcome.
    pub fn record_delivery(&mut self, attempt: &DeliveryAttempt) -> Result<(), TransitionError> {
        self.transition(attempt.outcome.status())?;
        self.attempts = attempt.attempts;
        match attempt.outcome {
            DeliveryOutcome::Sent => {
                self.email_sent = true;
                self.email_id = attempt.message_id.clone();
            }
            DeliveryOutcome::Failed => {
                self.error_kind = attempt.last_error;
                self.error_message = attempt.last_error_message.clone();
            }
        }
        Ok(())
    }
}
