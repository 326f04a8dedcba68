pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};

use crate::applications::handlers as applications;
use crate::jobs::handlers as jobs;
use crate::outreach::handlers as outreach;
use crate::resumes::handlers as resumes;
use crate::state::AppState;

/// Largest accepted request body; sized for resume uploads.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/", get(health::root_handler))
        // Resumes
        .route(
            "/api/user/:user_id/resumes",
            get(resumes::handle_list_resumes),
        )
        .route("/api/resume", post(resumes::handle_create_resume))
        .route(
            "/api/resume/parse-upload",
            post(resumes::handle_parse_upload),
        )
        .route(
            "/api/resume/:id",
            get(resumes::handle_get_resume).put(resumes::handle_update_resume),
        )
        .route("/api/resume/:id/analyze", post(resumes::handle_analyze))
        .route(
            "/api/resume/:id/analysis",
            get(resumes::handle_get_analysis),
        )
        .route(
            "/api/resume/:id/cover-letter",
            post(resumes::handle_cover_letter),
        )
        // Jobs and applications
        .route("/api/jobs/recent", get(jobs::handle_recent_jobs))
        .route("/api/jobs/search", post(jobs::handle_search_jobs))
        .route("/api/jobs/apply", post(applications::handle_apply))
        .route(
            "/api/applications/:user_id",
            get(applications::handle_list_applications),
        )
        .route(
            "/api/application/:id/status",
            patch(applications::handle_update_status),
        )
        .route(
            "/api/application/:id/retry",
            post(applications::handle_retry),
        )
        // Outreach
        .route(
            "/api/companies/contacts",
            get(outreach::handle_list_companies).post(outreach::handle_create_company),
        )
        .route("/api/email/campaign", post(outreach::handle_create_campaign))
        .route("/api/email/campaigns", get(outreach::handle_list_campaigns))
        .route("/api/email/campaign/:id", get(outreach::handle_get_campaign))
        .route(
            "/api/email/campaign/:id/dispatch",
            post(outreach::handle_dispatch_campaign),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
