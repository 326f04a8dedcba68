use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::delivery::state::DeliveryStatus;
use crate::models::analysis::{CoverLetter, ResumeAnalysis};
use crate::models::application::Application;
use crate::models::outreach::{CampaignRecipient, CompanyContact, EmailCampaign};
use crate::models::resume::Resume;

#[derive(Default)]
struct Tables {
    resumes: HashMap<Uuid, Resume>,
    analyses: Vec<ResumeAnalysis>,
    cover_letters: HashMap<Uuid, CoverLetter>,
    applications: HashMap<Uuid, Application>,
    companies: Vec<CompanyContact>,
    campaigns: HashMap<Uuid, EmailCampaign>,
    recipients: HashMap<Uuid, CampaignRecipient>,
}

const UNLIMITED: usize = usize::MAX;

/// In-memory store for tests. Mirrors the constraints the SQL schema enforces.
pub struct MemoryStore {
    tables: Mutex<Tables>,
    /// Application and recipient writes still allowed before they start
    /// failing as if the database were down.
    writes_left: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            tables: Mutex::default(),
            writes_left: AtomicUsize::new(UNLIMITED),
        }
    }
}

impl MemoryStore {
    pub fn fail_writes(&self, fail: bool) {
        let left = if fail { 0 } else { UNLIMITED };
        self.writes_left.store(left, Ordering::SeqCst);
    }

    /// Lets `n` more application/recipient writes through, then fails the rest.
    pub fn fail_writes_after(&self, n: usize) {
        self.writes_left.store(n, Ordering::SeqCst);
    }

    fn take_write(&self) -> Result<(), StoreError> {
        self.writes_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                UNLIMITED => Some(UNLIMITED),
                n => Some(n - 1),
            })
            .map(|_| ())
            .map_err(|_| StoreError::Database(sqlx::Error::PoolTimedOut))
    }

    pub fn cover_letter_count(&self) -> usize {
        self.tables.lock().unwrap().cover_letters.len()
    }

    pub fn application_count(&self) -> usize {
        self.tables.lock().unwrap().applications.len()
    }

    pub fn recipient_count(&self) -> usize {
        self.tables.lock().unwrap().recipients.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_resume(&self, resume: &Resume) -> Result<(), StoreError> {
        self.tables
            .lock()
            .unwrap()
            .resumes
            .insert(resume.id, resume.clone());
        Ok(())
    }

    async fn update_resume(&self, resume: &Resume) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        match tables.resumes.get_mut(&resume.id) {
            Some(existing) => {
                existing.sections = resume.sections.clone();
                existing.updated_at = resume.updated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_resume(&self, id: Uuid) -> Result<Option<Resume>, StoreError> {
        Ok(self.tables.lock().unwrap().resumes.get(&id).cloned())
    }

    async fn list_resumes(&self, user_id: &str) -> Result<Vec<Resume>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let mut resumes: Vec<_> = tables
            .resumes
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        resumes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(resumes)
    }

    async fn insert_analysis(&self, analysis: &ResumeAnalysis) -> Result<(), StoreError> {
        self.tables.lock().unwrap().analyses.push(analysis.clone());
        Ok(())
    }

    async fn latest_analysis(&self, resume_id: Uuid) -> Result<Option<ResumeAnalysis>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .analyses
            .iter()
            .filter(|a| a.resume_id == resume_id)
            .max_by_key(|a| a.created_at)
            .cloned())
    }

    async fn insert_cover_letter(&self, letter: &CoverLetter) -> Result<(), StoreError> {
        self.tables
            .lock()
            .unwrap()
            .cover_letters
            .insert(letter.id, letter.clone());
        Ok(())
    }

    async fn save_application(&self, application: &Application) -> Result<(), StoreError> {
        self.take_write()?;
        let mut tables = self.tables.lock().unwrap();
        let clash = tables.applications.values().any(|a| {
            a.id != application.id
                && a.is_active()
                && application.is_active()
                && a.user_id == application.user_id
                && a.resume_id == application.resume_id
                && a.job_id == application.job_id
        });
        if clash {
            return Err(StoreError::Conflict(format!(
                "an active application for job {} already exists",
                application.job_id
            )));
        }
        tables
            .applications
            .insert(application.id, application.clone());
        Ok(())
    }

    async fn get_application(&self, id: Uuid) -> Result<Option<Application>, StoreError> {
        Ok(self.tables.lock().unwrap().applications.get(&id).cloned())
    }

    async fn list_applications(&self, user_id: &str) -> Result<Vec<Application>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let mut apps: Vec<_> = tables
            .applications
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        apps.sort_by(|a, b| b.application_date.cmp(&a.application_date));
        Ok(apps)
    }

    async fn compare_and_set_status(
        &self,
        application: &Application,
        expected: DeliveryStatus,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        match tables.applications.get_mut(&application.id) {
            Some(stored) if stored.status == expected => {
                stored.status = application.status;
                stored.updated_at = application.updated_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_company(&self, company: &CompanyContact) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        if tables
            .companies
            .iter()
            .any(|c| c.company_name.eq_ignore_ascii_case(&company.company_name))
        {
            return Err(StoreError::Conflict(format!(
                "company '{}' already exists",
                company.company_name
            )));
        }
        tables.companies.push(company.clone());
        Ok(())
    }

    async fn list_companies(&self) -> Result<Vec<CompanyContact>, StoreError> {
        let mut companies = self.tables.lock().unwrap().companies.clone();
        companies.sort_by(|a, b| a.company_name.cmp(&b.company_name));
        Ok(companies)
    }

    async fn find_company(&self, name: &str) -> Result<Option<CompanyContact>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .companies
            .iter()
            .find(|c| c.company_name.eq_ignore_ascii_case(name.trim()))
            .cloned())
    }

    async fn insert_campaign(&self, campaign: &EmailCampaign) -> Result<(), StoreError> {
        self.tables
            .lock()
            .unwrap()
            .campaigns
            .insert(campaign.id, campaign.clone());
        Ok(())
    }

    async fn get_campaign(&self, id: Uuid) -> Result<Option<EmailCampaign>, StoreError> {
        Ok(self.tables.lock().unwrap().campaigns.get(&id).cloned())
    }

    async fn list_campaigns(&self, user_id: &str) -> Result<Vec<EmailCampaign>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let mut campaigns: Vec<_> = tables
            .campaigns
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(campaigns)
    }

    async fn save_recipient(&self, recipient: &CampaignRecipient) -> Result<(), StoreError> {
        self.take_write()?;
        self.tables
            .lock()
            .unwrap()
            .recipients
            .insert(recipient.id, recipient.clone());
        Ok(())
    }

    async fn get_recipient(&self, id: Uuid) -> Result<Option<CampaignRecipient>, StoreError> {
        Ok(self.tables.lock().unwrap().recipients.get(&id).cloned())
    }

    async fn list_recipients(&self, campaign_id: Uuid) -> Result<Vec<CampaignRecipient>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let mut latest: HashMap<(String, String), &CampaignRecipient> = HashMap::new();
        for recipient in tables.recipients.values().filter(|r| r.campaign_id == campaign_id) {
            let key = (
                recipient.company_name.to_lowercase(),
                recipient.email_address.to_lowercase(),
            );
            match latest.get(&key) {
                Some(current) if current.updated_at >= recipient.updated_at => {}
                _ => {
                    latest.insert(key, recipient);
                }
            }
        }
        let mut recipients: Vec<_> = latest.into_values().cloned().collect();
        recipients.sort_by(|a, b| {
            (&a.company_name, &a.email_address).cmp(&(&b.company_name, &b.email_address))
        });
        Ok(recipients)
    }
}
