use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::applications::orchestrator::{ApplyRequest, BatchResult};
use crate::delivery::state::DeliveryStatus;
use crate::errors::AppError;
use crate::models::application::Application;
use crate::pool::{run_detached, CancellationToken};
use crate::state::AppState;

/// POST /api/jobs/apply
///
/// The batch runs on its own task. If the client goes away, units that have
/// not started are skipped and the ones in flight finish normally.
pub async fn handle_apply(
    State(state): State<AppState>,
    Json(req): Json<ApplyRequest>,
) -> Result<Json<BatchResult>, AppError> {
    let token = CancellationToken::new();
    let _cancel_on_drop = token.cancel_on_drop();

    let orchestrator = state.orchestrator.clone();
    let task_token = token.clone();
    let result = run_detached(&token, state.batch_deadline, async move {
        orchestrator.apply_batch(req, task_token).await
    })
    .await
    .map_err(|e| anyhow::anyhow!("apply task failed: {e}"))??;

    Ok(Json(result))
}

/// GET /api/applications/:user_id
pub async fn handle_list_applications(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Application>>, AppError> {
    let applications = state.store.list_applications(&user_id).await?;
    Ok(Json(applications))
}

#[derive(Deserialize)]
pub struct StatusUpdate {
    pub status: DeliveryStatus,
}

/// PATCH /api/application/:id/status
pub async fn handle_update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusUpdate>,
) -> Result<Json<Application>, AppError> {
    let application = state.orchestrator.update_status(id, req.status).await?;
    Ok(Json(application))
}

#[derive(Deserialize)]
pub struct RetryRequest {
    #[serde(default = "default_send_emails")]
    pub send_emails: bool,
}

fn default_send_emails() -> bool {
    true
}

/// POST /api/application/:id/retry
pub async fn handle_retry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    req: Option<Json<RetryRequest>>,
) -> Result<Json<Application>, AppError> {
    let send_emails = req.map_or_else(default_send_emails, |Json(r)| r.send_emails);

    let token = CancellationToken::new();
    let _cancel_on_drop = token.cancel_on_drop();

    let orchestrator = state.orchestrator.clone();
    let task_token = token.clone();
    let application = run_detached(&token, state.batch_deadline, async move {
        orchestrator.retry(id, send_emails, task_token).await
    })
    .await
    .map_err(|e| anyhow::anyhow!("retry task failed: {e}"))??;

    Ok(Json(application))
}
