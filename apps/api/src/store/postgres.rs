use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{Store, StoreError};
use crate::delivery::state::{DeliveryStatus, FailureKind};
use crate::models::analysis::{AnalysisFindings, CoverLetter, ResumeAnalysis};
use crate::models::application::Application;
use crate::models::job::JobSnapshot;
use crate::models::outreach::{CampaignRecipient, CompanyContact, EmailCampaign};
use crate::models::resume::{Resume, ResumeSections};

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Row types
// ────────────────────────────────────────────────────────────────────────────

#[derive(FromRow)]
struct ResumeRow {
    id: Uuid,
    user_id: String,
    sections: Json<ResumeSections>,
    source_file_key: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ResumeRow> for Resume {
    fn from(row: ResumeRow) -> Self {
        Resume {
            id: row.id,
            user_id: row.user_id,
            sections: row.sections.0,
            source_file_key: row.source_file_key,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct AnalysisRow {
    id: Uuid,
    resume_id: Uuid,
    findings: Json<AnalysisFindings>,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct ApplicationRow {
    id: Uuid,
    user_id: String,
    resume_id: Uuid,
    job_id: String,
    job_snapshot: Option<Json<JobSnapshot>>,
    status: String,
    email_sent: bool,
    email_id: Option<String>,
    cover_letter_id: Option<Uuid>,
    error_kind: Option<String>,
    error_message: Option<String>,
    attempts: i32,
    application_date: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ApplicationRow> for Application {
    type Error = StoreError;

    fn try_from(row: ApplicationRow) -> Result<Self, Self::Error> {
        Ok(Application {
            id: row.id,
            user_id: row.user_id,
            resume_id: row.resume_id,
            job_id: row.job_id,
            job: row.job_snapshot.map(|j| j.0),
            status: parse_status(&row.status)?,
            email_sent: row.email_sent,
            email_id: row.email_id,
            cover_letter_id: row.cover_letter_id,
            error_kind: parse_kind(row.error_kind.as_deref())?,
            error_message: row.error_message,
            attempts: row.attempts.max(0) as u32,
            application_date: row.application_date,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct CompanyRow {
    id: Uuid,
    company_name: String,
    department: String,
    email_addresses: Vec<String>,
    created_at: DateTime<Utc>,
}

impl From<CompanyRow> for CompanyContact {
    fn from(row: CompanyRow) -> Self {
        CompanyContact {
            id: row.id,
            company_name: row.company_name,
            department: row.department,
            email_addresses: row.email_addresses,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct CampaignRow {
    id: Uuid,
    user_id: String,
    name: String,
    subject_template: String,
    body_template: String,
    target_companies: Vec<String>,
    created_at: DateTime<Utc>,
}

impl From<CampaignRow> for EmailCampaign {
    fn from(row: CampaignRow) -> Self {
        EmailCampaign {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            subject_template: row.subject_template,
            body_template: row.body_template,
            target_companies: row.target_companies,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct RecipientRow {
    id: Uuid,
    campaign_id: Uuid,
    company_name: String,
    email_address: String,
    status: String,
    attempts: i32,
    error_kind: Option<String>,
    error_message: Option<String>,
    message_id: Option<String>,
    last_attempt_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RecipientRow> for CampaignRecipient {
    type Error = StoreError;

    fn try_from(row: RecipientRow) -> Result<Self, Self::Error> {
        Ok(CampaignRecipient {
            id: row.id,
            campaign_id: row.campaign_id,
            company_name: row.company_name,
            email_address: row.email_address,
            status: parse_status(&row.status)?,
            attempts: row.attempts.max(0) as u32,
            error_kind: parse_kind(row.error_kind.as_deref())?,
            error_message: row.error_message,
            message_id: row.message_id,
            last_attempt_at: row.last_attempt_at,
            updated_at: row.updated_at,
        })
    }
}

fn parse_status(raw: &str) -> Result<DeliveryStatus, StoreError> {
    raw.parse().map_err(StoreError::Corrupt)
}

fn parse_kind(raw: Option<&str>) -> Result<Option<FailureKind>, StoreError> {
    raw.map(|k| k.parse().map_err(StoreError::Corrupt))
        .transpose()
}

fn map_unique(e: sqlx::Error, message: impl FnOnce() -> String) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StoreError::Conflict(message())
        }
        _ => StoreError::Database(e),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Store implementation
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl Store for PgStore {
    async fn insert_resume(&self, resume: &Resume) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO resumes (id, user_id, sections, source_file_key, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(resume.id)
        .bind(&resume.user_id)
        .bind(Json(&resume.sections))
        .bind(&resume.source_file_key)
        .bind(resume.created_at)
        .bind(resume.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_resume(&self, resume: &Resume) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE resumes SET sections = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(resume.id)
        .bind(Json(&resume.sections))
        .bind(resume.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_resume(&self, id: Uuid) -> Result<Option<Resume>, StoreError> {
        let row = sqlx::query_as::<_, ResumeRow>("SELECT * FROM resumes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Resume::from))
    }

    async fn list_resumes(&self, user_id: &str) -> Result<Vec<Resume>, StoreError> {
        let rows = sqlx::query_as::<_, ResumeRow>(
            "SELECT * FROM resumes WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Resume::from).collect())
    }

    async fn insert_analysis(&self, analysis: &ResumeAnalysis) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO resume_analyses (id, resume_id, findings, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(analysis.id)
        .bind(analysis.resume_id)
        .bind(Json(&analysis.findings))
        .bind(analysis.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_analysis(&self, resume_id: Uuid) -> Result<Option<ResumeAnalysis>, StoreError> {
        let row = sqlx::query_as::<_, AnalysisRow>(
            r#"
            SELECT * FROM resume_analyses
            WHERE resume_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(resume_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| ResumeAnalysis {
            id: r.id,
            resume_id: r.resume_id,
            findings: r.findings.0,
            created_at: r.created_at,
        }))
    }

    async fn insert_cover_letter(&self, letter: &CoverLetter) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO cover_letters
                (id, resume_id, company_name, position_title, job_description, content, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(letter.id)
        .bind(letter.resume_id)
        .bind(&letter.company_name)
        .bind(&letter.position_title)
        .bind(&letter.job_description)
        .bind(&letter.content)
        .bind(letter.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_application(&self, application: &Application) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO applications
                (id, user_id, resume_id, job_id, job_snapshot, status, email_sent, email_id,
                 cover_letter_id, error_kind, error_message, attempts, application_date, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                job_snapshot = EXCLUDED.job_snapshot,
                status = EXCLUDED.status,
                email_sent = EXCLUDED.email_sent,
                email_id = EXCLUDED.email_id,
                cover_letter_id = EXCLUDED.cover_letter_id,
                error_kind = EXCLUDED.error_kind,
                error_message = EXCLUDED.error_message,
                attempts = EXCLUDED.attempts,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(application.id)
        .bind(&application.user_id)
        .bind(application.resume_id)
        .bind(&application.job_id)
        .bind(application.job.as_ref().map(Json))
        .bind(application.status.as_str())
        .bind(application.email_sent)
        .bind(&application.email_id)
        .bind(application.cover_letter_id)
        .bind(application.error_kind.map(|k| k.as_str()))
        .bind(&application.error_message)
        .bind(application.attempts as i32)
        .bind(application.application_date)
        .bind(application.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_unique(e, || {
                format!(
                    "an active application for job {} already exists",
                    application.job_id
                )
            })
        })?;
        Ok(())
    }

    async fn get_application(&self, id: Uuid) -> Result<Option<Application>, StoreError> {
        sqlx::query_as::<_, ApplicationRow>("SELECT * FROM applications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Application::try_from)
            .transpose()
    }

    async fn list_applications(&self, user_id: &str) -> Result<Vec<Application>, StoreError> {
        sqlx::query_as::<_, ApplicationRow>(
            "SELECT * FROM applications WHERE user_id = $1 ORDER BY application_date DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Application::try_from)
        .collect()
    }

    async fn compare_and_set_status(
        &self,
        application: &Application,
        expected: DeliveryStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE applications SET status = $3, updated_at = $4 WHERE id = $1 AND status = $2",
        )
        .bind(application.id)
        .bind(expected.as_str())
        .bind(application.status.as_str())
        .bind(application.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_company(&self, company: &CompanyContact) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO company_contacts (id, company_name, department, email_addresses, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(company.id)
        .bind(&company.company_name)
        .bind(&company.department)
        .bind(&company.email_addresses)
        .bind(company.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_unique(e, || {
                format!("company '{}' already exists", company.company_name)
            })
        })?;
        Ok(())
    }

    async fn list_companies(&self) -> Result<Vec<CompanyContact>, StoreError> {
        let rows = sqlx::query_as::<_, CompanyRow>(
            "SELECT * FROM company_contacts ORDER BY company_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(CompanyContact::from).collect())
    }

    async fn find_company(&self, name: &str) -> Result<Option<CompanyContact>, StoreError> {
        let row = sqlx::query_as::<_, CompanyRow>(
            "SELECT * FROM company_contacts WHERE lower(company_name) = lower($1)",
        )
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(CompanyContact::from))
    }

    async fn insert_campaign(&self, campaign: &EmailCampaign) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO email_campaigns
                (id, user_id, name, subject_template, body_template, target_companies, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(campaign.id)
        .bind(&campaign.user_id)
        .bind(&campaign.name)
        .bind(&campaign.subject_template)
        .bind(&campaign.body_template)
        .bind(&campaign.target_companies)
        .bind(campaign.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_campaign(&self, id: Uuid) -> Result<Option<EmailCampaign>, StoreError> {
        let row = sqlx::query_as::<_, CampaignRow>("SELECT * FROM email_campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(EmailCampaign::from))
    }

    async fn list_campaigns(&self, user_id: &str) -> Result<Vec<EmailCampaign>, StoreError> {
        let rows = sqlx::query_as::<_, CampaignRow>(
            "SELECT * FROM email_campaigns WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(EmailCampaign::from).collect())
    }

    async fn save_recipient(&self, recipient: &CampaignRecipient) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO campaign_recipients
                (id, campaign_id, company_name, email_address, status, attempts, error_kind,
                 error_message, message_id, last_attempt_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                attempts = EXCLUDED.attempts,
                error_kind = EXCLUDED.error_kind,
                error_message = EXCLUDED.error_message,
                message_id = EXCLUDED.message_id,
                last_attempt_at = EXCLUDED.last_attempt_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(recipient.id)
        .bind(recipient.campaign_id)
        .bind(&recipient.company_name)
        .bind(&recipient.email_address)
        .bind(recipient.status.as_str())
        .bind(recipient.attempts as i32)
        .bind(recipient.error_kind.map(|k| k.as_str()))
        .bind(&recipient.error_message)
        .bind(&recipient.message_id)
        .bind(recipient.last_attempt_at)
        .bind(recipient.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_recipient(&self, id: Uuid) -> Result<Option<CampaignRecipient>, StoreError> {
        sqlx::query_as::<_, RecipientRow>("SELECT * FROM campaign_recipients WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(CampaignRecipient::try_from)
            .transpose()
    }

    async fn list_recipients(&self, campaign_id: Uuid) -> Result<Vec<CampaignRecipient>, StoreError> {
        sqlx::query_as::<_, RecipientRow>(
            r#"
            SELECT * FROM (
                SELECT DISTINCT ON (lower(company_name), lower(email_address)) *
                FROM campaign_recipients
                WHERE campaign_id = $1
                ORDER BY lower(company_name), lower(email_address), updated_at DESC
            ) latest
            ORDER BY company_name, email_address
            "#,
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(CampaignRecipient::try_from)
        .collect()
    }
}
