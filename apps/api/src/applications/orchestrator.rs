//! Application Orchestrator: applies one resume to a batch of jobs.
//!
//! Each job is an independent unit run on the shared worker pool:
//!
//!   reserve → resolve job → cover letter → persist pending → dispatch
//!   → persist final → finish
//!
//! A unit that sends writes its `pending` record before the dispatch, so a
//! reservation with a send behind it always has a stored record. A unit that
//! fails before anything was sent releases its reservation. Once a send
//! happened the reservation is kept, and closed from the delivery outcome
//! even when the final write fails.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::applications::email::application_email;
use crate::collaborators::{CoverLetterWriter, JobCatalog};
use crate::delivery::dispatcher::{DeliveryAttempt, MailDispatcher};
use crate::delivery::state::{DeliveryStatus, FailureKind};
use crate::errors::AppError;
use crate::ledger::{Fingerprint, IdempotencyLedger, LedgerState, Reservation, UnitOfWork};
use crate::models::analysis::{CoverLetter, CoverLetterJob};
use crate::models::application::Application;
use crate::models::job::{JobPosting, JobSnapshot};
use crate::models::resume::Resume;
use crate::pool::{CancellationToken, WorkerPool};
use crate::store::Store;

#[derive(Debug, Clone, Deserialize)]
pub struct ApplyRequest {
    pub user_id: String,
    pub resume_id: Uuid,
    pub job_ids: Vec<String>,
    #[serde(default)]
    pub send_emails: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    /// Applications not in `failed`.
    pub count: usize,
    /// One entry per distinct job id, in request order, failures included.
    pub applications: Vec<Application>,
    /// Jobs never started because the batch was cancelled.
    pub skipped_job_ids: Vec<String>,
}

enum UnitOutcome {
    Done(Application),
    Skipped(String),
}

/// How far a unit got with its email, for cleanup when a later step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    NotSent,
    Sending,
    Delivered(LedgerState),
}

/// Everything a unit needs that is shared by the whole batch.
struct BatchContext {
    user_id: String,
    resume: Resume,
    send_emails: bool,
    token: CancellationToken,
}

#[derive(Clone)]
pub struct ApplicationOrchestrator {
    store: Arc<dyn Store>,
    ledger: Arc<dyn IdempotencyLedger>,
    catalog: Arc<dyn JobCatalog>,
    writer: Arc<dyn CoverLetterWriter>,
    dispatcher: Arc<MailDispatcher>,
    pool: WorkerPool,
}

impl ApplicationOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: Arc<dyn IdempotencyLedger>,
        catalog: Arc<dyn JobCatalog>,
        writer: Arc<dyn CoverLetterWriter>,
        dispatcher: Arc<MailDispatcher>,
        pool: WorkerPool,
    ) -> Self {
        Self {
            store,
            ledger,
            catalog,
            writer,
            dispatcher,
            pool,
        }
    }

    pub async fn apply_batch(
        &self,
        request: ApplyRequest,
        token: CancellationToken,
    ) -> Result<BatchResult, AppError> {
        let user_id = request.user_id.trim().to_string();
        if user_id.is_empty() {
            return Err(AppError::Validation("user_id is required".into()));
        }
        let job_ids = distinct_job_ids(&request.job_ids)?;
        let resume = self.owned_resume(&user_id, request.resume_id).await?;

        info!(
            "Applying resume {} to {} job(s) for user {} (send_emails={})",
            resume.id,
            job_ids.len(),
            user_id,
            request.send_emails
        );

        let context = Arc::new(BatchContext {
            user_id,
            resume,
            send_emails: request.send_emails,
            token,
        });
        let orchestrator = self.clone();
        let outcomes = self
            .pool
            .map(job_ids, move |job_id| {
                let orchestrator = orchestrator.clone();
                let context = Arc::clone(&context);
                async move { orchestrator.run_unit(&context, &job_id).await }
            })
            .await
            .map_err(|e| anyhow::anyhow!("application unit panicked: {e}"))?;

        let mut result = BatchResult {
            count: 0,
            applications: Vec::new(),
            skipped_job_ids: Vec::new(),
        };
        for outcome in outcomes {
            match outcome? {
                UnitOutcome::Done(application) => result.applications.push(application),
                UnitOutcome::Skipped(job_id) => result.skipped_job_ids.push(job_id),
            }
        }
        result.count = result.applications.iter().filter(|a| a.is_active()).count();

        info!(
            "Batch done: {} active, {} total, {} skipped",
            result.count,
            result.applications.len(),
            result.skipped_job_ids.len()
        );
        Ok(result)
    }

    /// Deliberate retry of a failed application: releases its ledger entry
    /// and runs the unit again. The failed record stays as history.
    pub async fn retry(
        &self,
        application_id: Uuid,
        send_emails: bool,
        token: CancellationToken,
    ) -> Result<Application, AppError> {
        let failed = self
            .store
            .get_application(application_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Application {application_id} not found")))?;
        if failed.status != DeliveryStatus::Failed {
            return Err(AppError::Conflict(format!(
                "Application {} is {}; only failed applications can be retried",
                failed.id, failed.status
            )));
        }
        let resume = self.owned_resume(&failed.user_id, failed.resume_id).await?;

        let fingerprint = UnitOfWork::Application {
            user_id: &failed.user_id,
            resume_id: failed.resume_id,
            job_id: &failed.job_id,
        }
        .fingerprint();
        if !self.ledger.release_failed(&fingerprint, failed.id).await? {
            // Someone else already retried; the reservation below returns their record.
            info!("Nothing to release for {}", fingerprint);
        }

        let context = BatchContext {
            user_id: failed.user_id.clone(),
            resume,
            send_emails,
            token,
        };
        match self.run_unit(&context, &failed.job_id).await? {
            UnitOutcome::Done(application) => Ok(application),
            UnitOutcome::Skipped(job_id) => Err(AppError::Conflict(format!(
                "Retry of job {job_id} was cancelled before it started"
            ))),
        }
    }

    /// Applies an out-of-band status update (`sent` → `accepted`/`rejected`).
    pub async fn update_status(
        &self,
        application_id: Uuid,
        next: DeliveryStatus,
    ) -> Result<Application, AppError> {
        if !matches!(next, DeliveryStatus::Accepted | DeliveryStatus::Rejected) {
            return Err(AppError::Validation(format!(
                "status must be 'accepted' or 'rejected', got '{next}'"
            )));
        }
        let mut application = self
            .store
            .get_application(application_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Application {application_id} not found")))?;

        let expected = application.status;
        application.transition(next)?;
        if !self
            .store
            .compare_and_set_status(&application, expected)
            .await?
        {
            return Err(AppError::Conflict(format!(
                "Application {application_id} changed while being updated"
            )));
        }
        info!("Application {} moved {} -> {}", application.id, expected, next);
        Ok(application)
    }

    async fn owned_resume(&self, user_id: &str, resume_id: Uuid) -> Result<Resume, AppError> {
        self.store
            .get_resume(resume_id)
            .await?
            .filter(|r| r.user_id == user_id)
            .ok_or_else(|| AppError::NotFound(format!("Resume {resume_id} not found")))
    }

    async fn run_unit(&self, context: &BatchContext, job_id: &str) -> Result<UnitOutcome, AppError> {
        if context.token.is_cancelled() {
            return Ok(UnitOutcome::Skipped(job_id.to_string()));
        }

        let fingerprint = UnitOfWork::Application {
            user_id: &context.user_id,
            resume_id: context.resume.id,
            job_id,
        }
        .fingerprint();
        let record_id = Uuid::new_v4();

        let reservation = match self.ledger.reserve(&fingerprint, record_id).await {
            Ok(reservation) => reservation,
            Err(e) => {
                context.token.cancel();
                return Err(e.into());
            }
        };
        if let Reservation::AlreadyExists { record_id, state } = reservation {
            info!("Job {} already applied ({}), returning prior record", job_id, fingerprint);
            return self
                .prior_application(context, job_id, record_id, state)
                .await
                .map(UnitOutcome::Done);
        }

        let mut dispatch = Dispatch::NotSent;
        let result = self
            .execute(context, job_id, record_id, &fingerprint, &mut dispatch)
            .await;
        if result.is_err() {
            context.token.cancel();
            match dispatch {
                Dispatch::NotSent => self.release_quietly(&fingerprint).await,
                Dispatch::Sending => error!(
                    "Job {} was dispatched but its outcome is unknown; keeping reservation {}",
                    job_id, fingerprint
                ),
                Dispatch::Delivered(state) => {
                    error!(
                        "Job {} was dispatched but its final state could not be recorded; closing {} as {}",
                        job_id,
                        fingerprint,
                        state.as_str()
                    );
                    self.finish_quietly(&fingerprint, state).await;
                }
            }
        }
        result
    }

    async fn execute(
        &self,
        context: &BatchContext,
        job_id: &str,
        record_id: Uuid,
        fingerprint: &Fingerprint,
        dispatch: &mut Dispatch,
    ) -> Result<UnitOutcome, AppError> {
        let mut application =
            Application::pending(record_id, &context.user_id, context.resume.id, job_id);

        let job = match self.catalog.find_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                application.fail(FailureKind::JobNotFound, format!("Job {job_id} not found"))?;
                return self.settle(application, fingerprint).await;
            }
            Err(e) => {
                warn!("Catalog lookup for job {} failed: {}", job_id, e);
                application.fail(FailureKind::CatalogUnavailable, e.to_string())?;
                return self.settle(application, fingerprint).await;
            }
        };
        application.job = Some(JobSnapshot::from(&job));

        let cover_letter = self.cover_letter(&context.resume, &job).await?;
        application.cover_letter_id = cover_letter.as_ref().map(|l| l.id);

        if context.send_emails {
            if context.token.is_cancelled() {
                self.release_quietly(fingerprint).await;
                return Ok(UnitOutcome::Skipped(job_id.to_string()));
            }
            match job.contact_email.as_deref() {
                Some(to) => {
                    let email = application_email(
                        &context.resume,
                        &job,
                        to,
                        cover_letter.as_ref().map(|l| l.content.as_str()),
                    );
                    self.store.save_application(&application).await?;
                    *dispatch = Dispatch::Sending;
                    let attempt = self.dispatcher.send(&email).await;
                    application.record_delivery(&attempt)?;
                    *dispatch = Dispatch::Delivered(ledger_state(&application));
                }
                None => {
                    application.record_delivery(&DeliveryAttempt::rejected_locally(
                        "",
                        FailureKind::MissingRecipient,
                        format!("Job {job_id} has no contact address"),
                    ))?;
                }
            }
        }

        self.settle(application, fingerprint).await
    }

    /// Persists the finished record, then closes the ledger entry.
    async fn settle(
        &self,
        application: Application,
        fingerprint: &Fingerprint,
    ) -> Result<UnitOutcome, AppError> {
        self.store.save_application(&application).await?;
        self.ledger
            .finish(fingerprint, ledger_state(&application))
            .await?;

        info!(
            "Application {} for job {}: {}{}",
            application.id,
            application.job_id,
            application.status,
            application
                .error_kind
                .map(|k| format!(" ({k})"))
                .unwrap_or_default()
        );
        Ok(UnitOutcome::Done(application))
    }

    /// The cover letter is optional: a writer failure is logged and the
    /// application goes out without one.
    async fn cover_letter(
        &self,
        resume: &Resume,
        job: &JobPosting,
    ) -> Result<Option<CoverLetter>, AppError> {
        let request = CoverLetterJob {
            company_name: job.company.clone(),
            position_title: job.title.clone(),
            job_description: job.description.clone(),
            requirements: job.requirements.clone(),
        };
        match self.writer.write(resume, &request).await {
            Ok(content) => {
                let letter = CoverLetter::new(resume.id, &request, content);
                self.store.insert_cover_letter(&letter).await?;
                Ok(Some(letter))
            }
            Err(e) => {
                warn!(
                    "Cover letter for job {} unavailable, applying without one: {}",
                    job.id, e
                );
                Ok(None)
            }
        }
    }

    /// The record another call reserved. Until that call writes its first
    /// version a pending stand-in with the reserved id is returned.
    async fn prior_application(
        &self,
        context: &BatchContext,
        job_id: &str,
        record_id: Uuid,
        state: LedgerState,
    ) -> Result<Application, AppError> {
        if let Some(existing) = self.store.get_application(record_id).await? {
            return Ok(existing);
        }
        if state != LedgerState::InFlight {
            warn!(
                "Ledger says job {} is {} but record {} is missing",
                job_id,
                state.as_str(),
                record_id
            );
        }
        Ok(Application::pending(
            record_id,
            &context.user_id,
            context.resume.id,
            job_id,
        ))
    }

    async fn release_quietly(&self, fingerprint: &Fingerprint) {
        if let Err(e) = self.ledger.release(fingerprint).await {
            error!("Could not release reservation {}: {}", fingerprint, e);
        }
    }

    async fn finish_quietly(&self, fingerprint: &Fingerprint, state: LedgerState) {
        if let Err(e) = self.ledger.finish(fingerprint, state).await {
            error!("Could not close reservation {}: {}", fingerprint, e);
        }
    }
}

fn ledger_state(application: &Application) -> LedgerState {
    if application.is_active() {
        LedgerState::Completed
    } else {
        LedgerState::Failed
    }
}

/// Trims, rejects blanks and drops repeats while keeping first-seen order.
fn distinct_job_ids(job_ids: &[String]) -> Result<Vec<String>, AppError> {
    if job_ids.is_empty() {
        return Err(AppError::Validation("job_ids must not be empty".into()));
    }
    let mut seen = HashSet::new();
    let mut distinct = Vec::with_capacity(job_ids.len());
    for id in job_ids {
        let id = id.trim();
        if id.is_empty() {
            return Err(AppError::Validation("job_ids must not contain blanks".into()));
        }
        if seen.insert(id.to_string()) {
            distinct.push(id.to_string());
        }
    }
    Ok(distinct)
}
