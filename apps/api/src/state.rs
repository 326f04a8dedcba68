use std::sync::Arc;
use std::time::Duration;

use crate::applications::orchestrator::ApplicationOrchestrator;
use crate::collaborators::archive::FileArchive;
use crate::collaborators::{CoverLetterWriter, JobSearch, ResumeAnalyzer, ResumeParser};
use crate::outreach::fanout::CampaignFanout;
use crate::store::Store;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub jobs: Arc<dyn JobSearch>,
    pub writer: Arc<dyn CoverLetterWriter>,
    pub analyzer: Arc<dyn ResumeAnalyzer>,
    pub parser: Arc<dyn ResumeParser>,
    /// Archive for original upload files. `None` when S3 is not configured.
    pub archive: Option<Arc<dyn FileArchive>>,
    pub orchestrator: ApplicationOrchestrator,
    pub fanout: CampaignFanout,
    /// Upper bound on one batch apply or campaign dispatch.
    pub batch_deadline: Duration,
}
