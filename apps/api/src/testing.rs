//! Scripted collaborators and fixtures shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::applications::orchestrator::ApplicationOrchestrator;
use crate::collaborators::archive::FileArchive;
use crate::collaborators::extract::extract_text;
use crate::collaborators::{
    CollaboratorError, CoverLetterWriter, JobCatalog, JobSearch, ResumeAnalyzer, ResumeParser,
    UploadedFile,
};
use crate::delivery::dispatcher::{MailDispatcher, RetryPolicy};
use crate::delivery::state::FailureKind;
use crate::delivery::transport::{MailTransport, OutboundEmail, TransportError};
use crate::ledger::memory::MemoryLedger;
use crate::models::analysis::{AnalysisFindings, CoverLetterJob};
use crate::models::job::{JobPosting, JobQuery};
use crate::models::outreach::{CompanyContact, DEFAULT_DEPARTMENT};
use crate::models::resume::{Resume, ResumeSections};
use crate::outreach::fanout::CampaignFanout;
use crate::pool::WorkerPool;
use crate::state::AppState;
use crate::store::memory::MemoryStore;
use crate::store::Store;

pub fn email_to(address: &str) -> OutboundEmail {
    OutboundEmail {
        to: address.to_string(),
        subject: "Hello".into(),
        body: "Body".into(),
        reply_to: None,
    }
}

// ──────────────────────────────────────────────
// Mail transport
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub enum TransportRule {
    Always(FailureKind),
    /// Fails the first n calls to the address, then succeeds.
    FailTimes(u32, FailureKind),
    /// Never answers.
    Hang,
}

#[derive(Default)]
pub struct FakeTransport {
    rules: Mutex<HashMap<String, TransportRule>>,
    failures: Mutex<HashMap<String, u32>>,
    calls: Mutex<Vec<OutboundEmail>>,
    latency: Mutex<Option<Duration>>,
}

impl FakeTransport {
    pub fn set_rule(&self, address: &str, rule: TransportRule) {
        self.rules
            .lock()
            .unwrap()
            .insert(address.to_lowercase(), rule);
    }

    pub fn clear_rule(&self, address: &str) {
        self.rules.lock().unwrap().remove(&address.to_lowercase());
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, address: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.to.eq_ignore_ascii_case(address))
            .count()
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for FakeTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<String, TransportError> {
        let call_number = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(email.clone());
            calls.len()
        };
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let address = email.to.to_lowercase();
        let rule = self.rules.lock().unwrap().get(&address).copied();
        match rule {
            None => Ok(format!("msg-{call_number}")),
            Some(TransportRule::Always(kind)) => Err(TransportError::new(kind, "scripted failure")),
            Some(TransportRule::FailTimes(n, kind)) => {
                let mut failures = self.failures.lock().unwrap();
                let seen = failures.entry(address).or_insert(0);
                if *seen < n {
                    *seen += 1;
                    Err(TransportError::new(kind, "scripted failure"))
                } else {
                    Ok(format!("msg-{call_number}"))
                }
            }
            Some(TransportRule::Hang) => std::future::pending().await,
        }
    }
}

// ──────────────────────────────────────────────
// Collaborators
// ──────────────────────────────────────────────

pub fn job_posting(id: &str, contact_email: Option<&str>) -> JobPosting {
    JobPosting {
        id: id.to_string(),
        title: format!("Engineer {id}"),
        company: format!("Company {id}"),
        location: "Remote".into(),
        salary_min: Some(90_000),
        salary_max: Some(120_000),
        salary_currency: Some("USD".into()),
        source: "test".into(),
        description: "Build reliable services.".into(),
        requirements: vec!["Rust".into(), "PostgreSQL".into()],
        posted_date: Utc::now(),
        application_url: Some(format!("https://jobs.example.com/{id}")),
        contact_email: contact_email.map(str::to_string),
    }
}

/// Address the catalog fixture gives job `id`.
pub fn contact_for(id: &str) -> String {
    format!("hiring+{id}@example.com")
}

#[derive(Default)]
pub struct FakeCatalog {
    jobs: Mutex<HashMap<String, JobPosting>>,
    unavailable: AtomicBool,
}

impl FakeCatalog {
    pub fn with_jobs(ids: &[&str]) -> Self {
        let catalog = Self::default();
        for id in ids {
            catalog.insert(job_posting(id, Some(&contact_for(id))));
        }
        catalog
    }

    pub fn insert(&self, job: JobPosting) {
        self.jobs.lock().unwrap().insert(job.id.clone(), job);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobCatalog for FakeCatalog {
    async fn find_job(&self, job_id: &str) -> Result<Option<JobPosting>, CollaboratorError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable("catalog offline".into()));
        }
        Ok(self.jobs.lock().unwrap().get(job_id).cloned())
    }
}

#[async_trait]
impl JobSearch for FakeCatalog {
    async fn search(&self, query: &JobQuery) -> Result<Vec<JobPosting>, CollaboratorError> {
        let keywords = query.keywords.to_lowercase();
        let mut jobs: Vec<JobPosting> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| keywords.is_empty() || j.title.to_lowercase().contains(&keywords))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs.truncate(query.effective_limit() as usize);
        Ok(jobs)
    }
}

/// Writes a canned letter, or fails every call when told to.
#[derive(Default)]
pub struct FakeWriter {
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FakeWriter {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CoverLetterWriter for FakeWriter {
    async fn write(
        &self,
        resume: &Resume,
        job: &CoverLetterJob,
    ) -> Result<String, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable("writer offline".into()));
        }
        Ok(format!(
            "Dear {} team,\n\nI would like to join as {}.\n\n{}",
            job.company_name,
            job.position_title,
            resume.display_name()
        ))
    }
}

#[derive(Default)]
pub struct FakeAnalyzer {
    failing: AtomicBool,
}

impl FakeAnalyzer {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ResumeAnalyzer for FakeAnalyzer {
    async fn analyze(&self, resume: &Resume) -> Result<AnalysisFindings, CollaboratorError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable("analyzer offline".into()));
        }
        let mut findings = AnalysisFindings {
            ats_score: 72.0,
            strengths: vec![format!("{} skills listed", resume.sections.skills.len())],
            ..Default::default()
        };
        findings.section_scores.insert("skills".into(), 80.0);
        Ok(findings)
    }
}

/// Puts the extracted text into the summary and keeps everything else empty.
pub struct FakeParser;

#[async_trait]
impl ResumeParser for FakeParser {
    async fn parse(&self, file: &UploadedFile) -> Result<ResumeSections, CollaboratorError> {
        let text = extract_text(file)?;
        let mut sections = ResumeSections::default();
        sections.personal_info.name = text.lines().next().map(str::to_string);
        sections.summary = text;
        Ok(sections)
    }
}

#[derive(Default)]
pub struct FakeArchive {
    stored: Mutex<Vec<String>>,
}

impl FakeArchive {
    pub fn stored(&self) -> Vec<String> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileArchive for FakeArchive {
    async fn store(&self, user_id: &str, file: &UploadedFile) -> Result<String, CollaboratorError> {
        let key = format!("uploads/{user_id}/{}", file.filename);
        self.stored.lock().unwrap().push(key.clone());
        Ok(key)
    }
}

// ──────────────────────────────────────────────
// Fixtures
// ──────────────────────────────────────────────

pub fn sample_sections() -> ResumeSections {
    let mut sections = ResumeSections::default();
    sections.personal_info.name = Some("Ada Lovelace".into());
    sections.personal_info.email = Some("ada@example.com".into());
    sections.summary = "Engineer who ships reliable backend systems.".into();
    sections.skills = vec!["Rust".into(), "PostgreSQL".into()];
    sections
}

/// Retries quickly enough that tests need no paused clock.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        factor: 2,
        max_delay: Duration::from_millis(5),
        attempt_timeout: Duration::from_secs(2),
    }
}

/// In-memory wiring of the orchestration core.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub ledger: Arc<MemoryLedger>,
    pub catalog: Arc<FakeCatalog>,
    pub writer: Arc<FakeWriter>,
    pub analyzer: Arc<FakeAnalyzer>,
    pub archive: Arc<FakeArchive>,
    pub transport: Arc<FakeTransport>,
    pub dispatcher: Arc<MailDispatcher>,
    pub pool: WorkerPool,
}

impl Harness {
    pub fn new(job_ids: &[&str]) -> Self {
        let transport = Arc::new(FakeTransport::default());
        Self {
            store: Arc::new(MemoryStore::default()),
            ledger: Arc::new(MemoryLedger::default()),
            catalog: Arc::new(FakeCatalog::with_jobs(job_ids)),
            writer: Arc::new(FakeWriter::default()),
            analyzer: Arc::new(FakeAnalyzer::default()),
            archive: Arc::new(FakeArchive::default()),
            dispatcher: Arc::new(MailDispatcher::new(transport.clone(), fast_policy())),
            transport,
            pool: WorkerPool::new(4),
        }
    }

    pub fn orchestrator(&self) -> ApplicationOrchestrator {
        ApplicationOrchestrator::new(
            self.store.clone(),
            self.ledger.clone(),
            self.catalog.clone(),
            self.writer.clone(),
            self.dispatcher.clone(),
            self.pool.clone(),
        )
    }

    pub fn fanout(&self) -> CampaignFanout {
        CampaignFanout::new(
            self.store.clone(),
            self.ledger.clone(),
            self.dispatcher.clone(),
            self.pool.clone(),
        )
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            store: self.store.clone(),
            jobs: self.catalog.clone(),
            writer: self.writer.clone(),
            analyzer: self.analyzer.clone(),
            parser: Arc::new(FakeParser),
            archive: Some(self.archive.clone()),
            orchestrator: self.orchestrator(),
            fanout: self.fanout(),
            batch_deadline: Duration::from_secs(30),
        }
    }

    pub async fn seed_resume(&self, user_id: &str) -> Resume {
        let resume = Resume::new(user_id.to_string(), sample_sections());
        self.store.insert_resume(&resume).await.unwrap();
        resume
    }

    pub async fn seed_company(&self, name: &str, addresses: &[&str]) -> CompanyContact {
        let company = CompanyContact {
            id: uuid::Uuid::new_v4(),
            company_name: name.to_string(),
            department: DEFAULT_DEPARTMENT.to_string(),
            email_addresses: addresses.iter().map(|a| a.to_string()).collect(),
            created_at: Utc::now(),
        };
        self.store.insert_company(&company).await.unwrap();
        company
    }
}
