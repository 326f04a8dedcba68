//! Campaign Fan-out Engine: expands one campaign into one delivery per
//! (company, address) and records each outcome.
//!
//! Companies run concurrently on the shared worker pool; the addresses of a
//! single company go out one after another. Every address is reserved in the
//! ledger before it is sent to, so dispatching the same campaign again only
//! reaches addresses that were never reserved.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::delivery::dispatcher::MailDispatcher;
use crate::delivery::state::{DeliveryStatus, FailureKind};
use crate::delivery::transport::OutboundEmail;
use crate::errors::AppError;
use crate::ledger::{Fingerprint, IdempotencyLedger, LedgerState, Reservation, UnitOfWork};
use crate::models::outreach::{CampaignRecipient, EmailCampaign};
use crate::outreach::template::render_for_company;
use crate::pool::{CancellationToken, WorkerPool};
use crate::store::Store;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct DispatchOptions {
    /// Release failed recipients first so they are attempted again.
    #[serde(default)]
    pub retry_failed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientOutcome {
    /// Sent to the dispatcher during this call.
    Dispatched,
    /// Reserved by an earlier dispatch; nothing was sent this time.
    AlreadyDispatched,
    /// Not started because the dispatch was cancelled.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipientResult {
    pub email_address: String,
    pub outcome: RecipientOutcome,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub error_kind: Option<FailureKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompanyResult {
    pub company_name: String,
    /// Set when the company itself could not be resolved.
    pub error_kind: Option<FailureKind>,
    pub recipients: Vec<RecipientResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignDispatch {
    pub campaign_id: Uuid,
    pub sent: usize,
    /// Failed deliveries plus companies that could not be resolved.
    pub failed: usize,
    pub skipped: usize,
    pub already_dispatched: usize,
    pub companies: Vec<CompanyResult>,
}

impl CampaignDispatch {
    fn tally(campaign_id: Uuid, companies: Vec<CompanyResult>) -> Self {
        let mut dispatch = CampaignDispatch {
            campaign_id,
            sent: 0,
            failed: 0,
            skipped: 0,
            already_dispatched: 0,
            companies: Vec::new(),
        };
        for company in &companies {
            if company.error_kind.is_some() {
                dispatch.failed += 1;
            }
            for recipient in &company.recipients {
                match (recipient.outcome, recipient.status) {
                    (RecipientOutcome::Dispatched, DeliveryStatus::Failed) => dispatch.failed += 1,
                    (RecipientOutcome::Dispatched, _) => dispatch.sent += 1,
                    (RecipientOutcome::AlreadyDispatched, _) => dispatch.already_dispatched += 1,
                    (RecipientOutcome::Skipped, _) => dispatch.skipped += 1,
                }
            }
        }
        dispatch.companies = companies;
        dispatch
    }
}

#[derive(Clone)]
pub struct CampaignFanout {
    store: Arc<dyn Store>,
    ledger: Arc<dyn IdempotencyLedger>,
    dispatcher: Arc<MailDispatcher>,
    pool: WorkerPool,
}

impl CampaignFanout {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: Arc<dyn IdempotencyLedger>,
        dispatcher: Arc<MailDispatcher>,
        pool: WorkerPool,
    ) -> Self {
        Self {
            store,
            ledger,
            dispatcher,
            pool,
        }
    }

    pub async fn dispatch(
        &self,
        campaign: EmailCampaign,
        options: DispatchOptions,
        token: CancellationToken,
    ) -> Result<CampaignDispatch, AppError> {
        if options.retry_failed {
            self.release_failed(&campaign).await?;
        }

        let companies = distinct_ignoring_case(&campaign.target_companies);
        info!(
            "Dispatching campaign {} ({}) to {} company(ies)",
            campaign.id,
            campaign.name,
            companies.len()
        );

        let campaign = Arc::new(campaign);
        let fanout = self.clone();
        let task_campaign = Arc::clone(&campaign);
        let results = self
            .pool
            .map(companies, move |company_name| {
                let fanout = fanout.clone();
                let campaign = Arc::clone(&task_campaign);
                let token = token.clone();
                async move { fanout.run_company(&campaign, &company_name, &token).await }
            })
            .await
            .map_err(|e| anyhow::anyhow!("campaign unit panicked: {e}"))?;

        let companies = results.into_iter().collect::<Result<Vec<_>, _>>()?;
        let dispatch = CampaignDispatch::tally(campaign.id, companies);
        info!(
            "Campaign {} done: {} sent, {} failed, {} already dispatched, {} skipped",
            campaign.id,
            dispatch.sent,
            dispatch.failed,
            dispatch.already_dispatched,
            dispatch.skipped
        );
        Ok(dispatch)
    }

    async fn run_company(
        &self,
        campaign: &EmailCampaign,
        company_name: &str,
        token: &CancellationToken,
    ) -> Result<CompanyResult, AppError> {
        let contact = match self.store.find_company(company_name).await {
            Ok(Some(contact)) => contact,
            Ok(None) => {
                warn!(
                    "Campaign {} targets unknown company '{}'",
                    campaign.id, company_name
                );
                return Ok(CompanyResult {
                    company_name: company_name.to_string(),
                    error_kind: Some(FailureKind::CompanyNotFound),
                    recipients: Vec::new(),
                });
            }
            Err(e) => {
                token.cancel();
                return Err(e.into());
            }
        };

        let subject = render_for_company(&campaign.subject_template, &contact.company_name);
        let body = render_for_company(&campaign.body_template, &contact.company_name);

        let mut recipients = Vec::new();
        for address in distinct_ignoring_case(&contact.email_addresses) {
            let email = OutboundEmail {
                to: address,
                subject: subject.clone(),
                body: body.clone(),
                reply_to: None,
            };
            let result = self
                .run_recipient(campaign, &contact.company_name, email, token)
                .await;
            match result {
                Ok(recipient) => recipients.push(recipient),
                Err(e) => {
                    token.cancel();
                    return Err(e);
                }
            }
        }

        Ok(CompanyResult {
            company_name: contact.company_name,
            error_kind: None,
            recipients,
        })
    }

    async fn run_recipient(
        &self,
        campaign: &EmailCampaign,
        company_name: &str,
        email: OutboundEmail,
        token: &CancellationToken,
    ) -> Result<RecipientResult, AppError> {
        if token.is_cancelled() {
            return Ok(RecipientResult {
                email_address: email.to,
                outcome: RecipientOutcome::Skipped,
                status: DeliveryStatus::Pending,
                attempts: 0,
                error_kind: None,
            });
        }

        let fingerprint = recipient_fingerprint(campaign.id, company_name, &email.to);
        let record_id = Uuid::new_v4();

        if let Reservation::AlreadyExists { record_id, .. } =
            self.ledger.reserve(&fingerprint, record_id).await?
        {
            let prior = self.store.get_recipient(record_id).await?;
            return Ok(RecipientResult {
                email_address: email.to,
                outcome: RecipientOutcome::AlreadyDispatched,
                status: prior.as_ref().map_or(DeliveryStatus::Pending, |r| r.status),
                attempts: prior.as_ref().map_or(0, |r| r.attempts),
                error_kind: prior.and_then(|r| r.error_kind),
            });
        }

        let mut recipient =
            CampaignRecipient::pending(record_id, campaign.id, company_name, &email.to);
        if let Err(e) = self.store.save_recipient(&recipient).await {
            if let Err(e) = self.ledger.release(&fingerprint).await {
                error!("Could not release reservation {}: {}", fingerprint, e);
            }
            return Err(e.into());
        }

        let attempt = self.dispatcher.send(&email).await;
        if let Err(e) = recipient.record_delivery(&attempt) {
            error!(
                "Recipient {} of campaign {} was dispatched but its outcome is unknown; keeping reservation",
                email.to, campaign.id
            );
            return Err(e.into());
        }
        let state = if recipient.status == DeliveryStatus::Failed {
            LedgerState::Failed
        } else {
            LedgerState::Completed
        };
        if let Err(e) = self.store.save_recipient(&recipient).await {
            error!(
                "Recipient {} of campaign {} was dispatched but could not be recorded; closing reservation as {}",
                email.to,
                campaign.id,
                state.as_str()
            );
            if let Err(e) = self.ledger.finish(&fingerprint, state).await {
                error!("Could not close reservation {}: {}", fingerprint, e);
            }
            return Err(e.into());
        }
        self.ledger.finish(&fingerprint, state).await?;

        Ok(RecipientResult {
            email_address: recipient.email_address,
            outcome: RecipientOutcome::Dispatched,
            status: recipient.status,
            attempts: recipient.attempts,
            error_kind: recipient.error_kind,
        })
    }

    async fn release_failed(&self, campaign: &EmailCampaign) -> Result<(), AppError> {
        let mut released = 0;
        for recipient in self.store.list_recipients(campaign.id).await? {
            if recipient.status != DeliveryStatus::Failed {
                continue;
            }
            let fingerprint =
                recipient_fingerprint(campaign.id, &recipient.company_name, &recipient.email_address);
            if self.ledger.release_failed(&fingerprint, recipient.id).await? {
                released += 1;
            }
        }
        info!(
            "Released {} failed recipient(s) of campaign {} for retry",
            released, campaign.id
        );
        Ok(())
    }
}

fn recipient_fingerprint(campaign_id: Uuid, company_name: &str, address: &str) -> Fingerprint {
    UnitOfWork::CampaignRecipient {
        campaign_id,
        company_name,
        address,
    }
    .fingerprint()
}

/// Trimmed, non-empty, first spelling wins among case-insensitive repeats.
fn distinct_ignoring_case(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty() && seen.insert(n.to_lowercase()))
        .map(str::to_string)
        .collect()
}
