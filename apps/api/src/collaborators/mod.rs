//! Capability interfaces for the systems the orchestration core leans on but
//! does not own: the job catalog, cover-letter generation, resume scoring
//! and upload parsing.
//!
//! Each trait has a single method and a single failure type so a
//! model-backed, rule-based or scripted implementation can be swapped in.

pub mod archive;
pub mod catalog;
pub mod extract;
pub mod llm;
pub mod prompts;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::llm_client::LlmError;
use crate::models::analysis::{AnalysisFindings, CoverLetterJob};
use crate::models::job::{JobPosting, JobQuery};
use crate::models::resume::{Resume, ResumeSections};

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Catalog database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unsupported file type: {0}")]
    UnsupportedFile(String),

    #[error("Could not extract text: {0}")]
    Extraction(String),

    #[error("Collaborator returned unusable output: {0}")]
    InvalidOutput(String),

    #[error("{0}")]
    Unavailable(String),
}

/// An uploaded file as received from the multipart form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Resolves a single posting. `Ok(None)` means the catalog answered and the
/// job does not exist; `Err` means the catalog could not answer.
#[async_trait]
pub trait JobCatalog: Send + Sync {
    async fn find_job(&self, job_id: &str) -> Result<Option<JobPosting>, CollaboratorError>;
}

/// Listing and searching of postings. An empty keyword string means "most recent".
#[async_trait]
pub trait JobSearch: Send + Sync {
    async fn search(&self, query: &JobQuery) -> Result<Vec<JobPosting>, CollaboratorError>;
}

#[async_trait]
pub trait CoverLetterWriter: Send + Sync {
    async fn write(&self, resume: &Resume, job: &CoverLetterJob)
        -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait ResumeAnalyzer: Send + Sync {
    async fn analyze(&self, resume: &Resume) -> Result<AnalysisFindings, CollaboratorError>;
}

#[async_trait]
pub trait ResumeParser: Send + Sync {
    async fn parse(&self, file: &UploadedFile) -> Result<ResumeSections, CollaboratorError>;
}
