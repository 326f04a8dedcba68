use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::delivery::dispatcher::DeliveryAttempt;
use crate::delivery::state::{DeliveryStatus, FailureKind, TransitionError};

pub const DEFAULT_DEPARTMENT: &str = "HR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyContact {
    pub id: Uuid,
    pub company_name: String,
    pub department: String,
    pub email_addresses: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A cold-outreach campaign. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailCampaign {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub subject_template: String,
    pub body_template: String,
    pub target_companies: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Persisted delivery record for one (campaign, company, address).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignRecipient {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub company_name: String,
    pub email_address: String,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub error_kind: Option<FailureKind>,
    pub error_message: Option<String>,
    pub message_id: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl CampaignRecipient {
    pub fn pending(id: Uuid, campaign_id: Uuid, company_name: &str, email_address: &str) -> Self {
        Self {
            id,
            campaign_id,
            company_name: company_name.to_string(),
            email_address: email_address.to_string(),
            status: DeliveryStatus::Pending,
            attempts: 0,
            error_kind: None,
            error_message: None,
            message_id: None,
            last_attempt_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn record_delivery(&mut self, attempt: &DeliveryAttempt) -> Result<(), TransitionError> {
        self.status = self.status.transition(attempt.outcome.status())?;
        self.attempts = attempt.attempts;
        self.message_id = attempt.message_id.clone();
        self.error_kind = attempt.last_error;
        self.error_message = attempt.last_error_message.clone();
        self.last_attempt_at = attempt.last_attempt_at;
        self.updated_at = Utc::now();
        Ok(())
    }
}
