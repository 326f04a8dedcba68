use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A posting from the external job catalog. Read-only to this service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct JobPosting {
    pub id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub salary_currency: Option<String>,
    pub source: String,
    pub description: String,
    pub requirements: Vec<String>,
    pub posted_date: DateTime<Utc>,
    pub application_url: Option<String>,
    /// Where application emails for this posting are dispatched.
    pub contact_email: Option<String>,
}

/// The part of a posting frozen onto an application at the time it is made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub title: String,
    pub company: String,
    pub location: String,
    pub application_url: Option<String>,
}

impl From<&JobPosting> for JobSnapshot {
    fn from(job: &JobPosting) -> Self {
        Self {
            title: job.title.clone(),
            company: job.company.clone(),
            location: job.location.clone(),
            application_url: job.application_url.clone(),
        }
    }
}

pub const DEFAULT_JOB_LIMIT: u32 = 20;
pub const MAX_JOB_LIMIT: u32 = 100;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobQuery {
    #[serde(default)]
    pub keywords: String,
    pub location: Option<String>,
    pub salary_min: Option<i64>,
    pub limit: Option<u32>,
}

impl JobQuery {
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_JOB_LIMIT).clamp(1, MAX_JOB_LIMIT)
    }
}
