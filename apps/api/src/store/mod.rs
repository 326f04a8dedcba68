//! Application/Contact Store: durable records of resumes, applications,
//! companies and campaigns.
//!
//! Every write is a single statement (upsert by id), so a concurrent reader
//! sees either the previous version of a record or the new one, never a mix.

#[cfg(test)]
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::delivery::state::DeliveryStatus;
use crate::models::analysis::{CoverLetter, ResumeAnalysis};
use crate::models::application::Application;
use crate::models::outreach::{CampaignRecipient, CompanyContact, EmailCampaign};
use crate::models::resume::Resume;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("{0}")]
    Conflict(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_resume(&self, resume: &Resume) -> Result<(), StoreError>;
    /// Returns false when no resume with that id exists.
    async fn update_resume(&self, resume: &Resume) -> Result<bool, StoreError>;
    async fn get_resume(&self, id: Uuid) -> Result<Option<Resume>, StoreError>;
    async fn list_resumes(&self, user_id: &str) -> Result<Vec<Resume>, StoreError>;

    async fn insert_analysis(&self, analysis: &ResumeAnalysis) -> Result<(), StoreError>;
    async fn latest_analysis(&self, resume_id: Uuid) -> Result<Option<ResumeAnalysis>, StoreError>;
    async fn insert_cover_letter(&self, letter: &CoverLetter) -> Result<(), StoreError>;

    /// Inserts or replaces the application with the same id.
    async fn save_application(&self, application: &Application) -> Result<(), StoreError>;
    async fn get_application(&self, id: Uuid) -> Result<Option<Application>, StoreError>;
    async fn list_applications(&self, user_id: &str) -> Result<Vec<Application>, StoreError>;
    /// Writes `application.status` only if the stored status is still
    /// `expected`. Returns false when the stored record moved on.
    async fn compare_and_set_status(
        &self,
        application: &Application,
        expected: DeliveryStatus,
    ) -> Result<bool, StoreError>;

    /// Fails with `StoreError::Conflict` when the company name is taken.
    async fn insert_company(&self, company: &CompanyContact) -> Result<(), StoreError>;
    async fn list_companies(&self) -> Result<Vec<CompanyContact>, StoreError>;
    /// Case-insensitive lookup by company name.
    async fn find_company(&self, name: &str) -> Result<Option<CompanyContact>, StoreError>;

    async fn insert_campaign(&self, campaign: &EmailCampaign) -> Result<(), StoreError>;
    async fn get_campaign(&self, id: Uuid) -> Result<Option<EmailCampaign>, StoreError>;
    async fn list_campaigns(&self, user_id: &str) -> Result<Vec<EmailCampaign>, StoreError>;
    async fn save_recipient(&self, recipient: &CampaignRecipient) -> Result<(), StoreError>;
    async fn get_recipient(&self, id: Uuid) -> Result<Option<CampaignRecipient>, StoreError>;
    /// The latest row per (company, address). Rows superseded by a retry
    /// stay in the table but are not listed.
    async fn list_recipients(&self, campaign_id: Uuid) -> Result<Vec<CampaignRecipient>, StoreError>;
}
