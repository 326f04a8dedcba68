use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::job::{JobPosting, JobQuery};
use crate::state::AppState;

#[derive(Serialize)]
pub struct JobList {
    pub jobs: Vec<JobPosting>,
}

#[derive(Deserialize)]
pub struct RecentQuery {
    pub limit: Option<u32>,
}

/// GET /api/jobs/recent?limit=N
pub async fn handle_recent_jobs(
    State(state): State<AppState>,
    Query(params): Query<RecentQuery>,
) -> Result<Json<JobList>, AppError> {
    let query = JobQuery {
        limit: params.limit,
        ..Default::default()
    };
    let jobs = state.jobs.search(&query).await?;
    Ok(Json(JobList { jobs }))
}

/// POST /api/jobs/search
pub async fn handle_search_jobs(
    State(state): State<AppState>,
    Json(query): Json<JobQuery>,
) -> Result<Json<JobList>, AppError> {
    let jobs = state.jobs.search(&query).await?;
    Ok(Json(JobList { jobs }))
}
