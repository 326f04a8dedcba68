use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::collaborators::{CollaboratorError, UploadedFile};
use crate::errors::AppError;
use crate::models::analysis::{CoverLetter, CoverLetterJob, ResumeAnalysis};
use crate::models::resume::{Resume, ResumeSections};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NewResume {
    pub user_id: String,
    #[serde(flatten)]
    pub sections: ResumeSections,
}

/// GET /api/user/:user_id/resumes
pub async fn handle_list_resumes(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Resume>>, AppError> {
    Ok(Json(state.store.list_resumes(&user_id).await?))
}

/// POST /api/resume
pub async fn handle_create_resume(
    State(state): State<AppState>,
    Json(req): Json<NewResume>,
) -> Result<(StatusCode, Json<Resume>), AppError> {
    let user_id = req.user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::Validation("user_id is required".into()));
    }
    let resume = Resume::new(user_id.to_string(), req.sections);
    state.store.insert_resume(&resume).await?;
    info!("Created resume {} for user {}", resume.id, resume.user_id);
    Ok((StatusCode::CREATED, Json(resume)))
}

/// GET /api/resume/:id
pub async fn handle_get_resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Resume>, AppError> {
    Ok(Json(load_resume(&state, id).await?))
}

/// PUT /api/resume/:id
///
/// Replaces every section. Owner, id and creation time stay as they were.
pub async fn handle_update_resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(sections): Json<ResumeSections>,
) -> Result<Json<Resume>, AppError> {
    let mut resume = load_resume(&state, id).await?;
    resume.sections = sections;
    resume.updated_at = Utc::now();
    if !state.store.update_resume(&resume).await? {
        return Err(AppError::NotFound(format!("Resume {id} not found")));
    }
    Ok(Json(resume))
}

/// POST /api/resume/parse-upload
///
/// Multipart form with a `file` part and a `user_id` part.
pub async fn handle_parse_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Resume>), AppError> {
    let mut user_id = None;
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed upload: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("user_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Malformed user_id: {e}")))?;
                user_id = Some(text.trim().to_string());
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Malformed file: {e}")))?;
                file = Some(UploadedFile {
                    filename,
                    content_type,
                    bytes,
                });
            }
            _ => {}
        }
    }

    let user_id = user_id
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AppError::Validation("user_id is required".into()))?;
    let file = file.ok_or_else(|| AppError::Validation("file is required".into()))?;

    let sections = state.parser.parse(&file).await.map_err(|e| match e {
        CollaboratorError::UnsupportedFile(msg) | CollaboratorError::Extraction(msg) => {
            AppError::Validation(msg)
        }
        other => AppError::Collaborator(other),
    })?;

    let mut resume = Resume::new(user_id, sections);
    if let Some(archive) = &state.archive {
        match archive.store(&resume.user_id, &file).await {
            Ok(key) => resume.source_file_key = Some(key),
            Err(e) => warn!("Upload for user {} not archived: {}", resume.user_id, e),
        }
    }
    state.store.insert_resume(&resume).await?;

    info!(
        "Parsed upload '{}' into resume {} for user {}",
        file.filename, resume.id, resume.user_id
    );
    Ok((StatusCode::CREATED, Json(resume)))
}

/// POST /api/resume/:id/analyze
pub async fn handle_analyze(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResumeAnalysis>, AppError> {
    let resume = load_resume(&state, id).await?;
    let findings = state.analyzer.analyze(&resume).await?;

    let analysis = ResumeAnalysis {
        id: Uuid::new_v4(),
        resume_id: resume.id,
        findings: findings.clamped(),
        created_at: Utc::now(),
    };
    state.store.insert_analysis(&analysis).await?;
    info!(
        "Analyzed resume {}: ATS score {:.0}",
        resume.id, analysis.findings.ats_score
    );
    Ok(Json(analysis))
}

/// GET /api/resume/:id/analysis
pub async fn handle_get_analysis(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResumeAnalysis>, AppError> {
    state
        .store
        .latest_analysis(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No analysis for resume {id}")))
}

/// POST /api/resume/:id/cover-letter
pub async fn handle_cover_letter(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(job): Json<CoverLetterJob>,
) -> Result<Json<CoverLetter>, AppError> {
    if job.company_name.trim().is_empty() || job.position_title.trim().is_empty() {
        return Err(AppError::Validation(
            "company_name and position_title are required".into(),
        ));
    }
    let resume = load_resume(&state, id).await?;
    let content = state.writer.write(&resume, &job).await?;

    let letter = CoverLetter::new(resume.id, &job, content);
    state.store.insert_cover_letter(&letter).await?;
    Ok(Json(letter))
}

async fn load_resume(state: &AppState, id: Uuid) -> Result<Resume, AppError> {
    state
        .store
        .get_resume(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Resume {id} not found")))
}
