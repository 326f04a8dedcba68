use std::collections::HashSet;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::delivery::transport::is_valid_address;
use crate::errors::AppError;
use crate::models::outreach::{CampaignRecipient, CompanyContact, EmailCampaign, DEFAULT_DEPARTMENT};
use crate::outreach::fanout::{CampaignDispatch, DispatchOptions};
use crate::pool::{run_detached, CancellationToken};
use crate::state::AppState;

// ──────────────────────────────────────────────
// Company contacts
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NewCompanyContact {
    pub company_name: String,
    #[serde(default)]
    pub email_addresses: Vec<String>,
    pub department: Option<String>,
}

impl NewCompanyContact {
    fn validate(self) -> Result<CompanyContact, AppError> {
        let company_name = self.company_name.trim().to_string();
        if company_name.is_empty() {
            return Err(AppError::Validation("company_name is required".into()));
        }

        let mut seen = HashSet::new();
        let mut addresses = Vec::new();
        for address in &self.email_addresses {
            let address = address.trim();
            if address.is_empty() {
                continue;
            }
            if !is_valid_address(address) {
                return Err(AppError::Validation(format!(
                    "'{address}' is not a valid email address"
                )));
            }
            if seen.insert(address.to_lowercase()) {
                addresses.push(address.to_string());
            }
        }
        if addresses.is_empty() {
            return Err(AppError::Validation(
                "at least one email address is required".into(),
            ));
        }

        let department = self
            .department
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| DEFAULT_DEPARTMENT.to_string());

        Ok(CompanyContact {
            id: Uuid::new_v4(),
            company_name,
            department,
            email_addresses: addresses,
            created_at: Utc::now(),
        })
    }
}

/// GET /api/companies/contacts
pub async fn handle_list_companies(
    State(state): State<AppState>,
) -> Result<Json<Vec<CompanyContact>>, AppError> {
    Ok(Json(state.store.list_companies().await?))
}

/// POST /api/companies/contacts
pub async fn handle_create_company(
    State(state): State<AppState>,
    Json(req): Json<NewCompanyContact>,
) -> Result<(StatusCode, Json<CompanyContact>), AppError> {
    let company = req.validate()?;
    state.store.insert_company(&company).await?;
    info!(
        "Added company contact {} with {} address(es)",
        company.company_name,
        company.email_addresses.len()
    );
    Ok((StatusCode::CREATED, Json(company)))
}

// ──────────────────────────────────────────────
// Campaigns
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NewCampaign {
    pub user_id: String,
    pub campaign_name: String,
    pub email_subject: String,
    pub email_template: String,
    #[serde(default)]
    pub target_companies: Vec<String>,
}

impl NewCampaign {
    fn validate(self) -> Result<EmailCampaign, AppError> {
        let required = [
            ("user_id", &self.user_id),
            ("campaign_name", &self.campaign_name),
            ("email_subject", &self.email_subject),
            ("email_template", &self.email_template),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(AppError::Validation(format!("{field} is required")));
            }
        }
        let target_companies: Vec<String> = self
            .target_companies
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if target_companies.is_empty() {
            return Err(AppError::Validation(
                "at least one target company is required".into(),
            ));
        }

        Ok(EmailCampaign {
            id: Uuid::new_v4(),
            user_id: self.user_id.trim().to_string(),
            name: self.campaign_name.trim().to_string(),
            subject_template: self.email_subject,
            body_template: self.email_template,
            target_companies,
            created_at: Utc::now(),
        })
    }
}

#[derive(Serialize)]
pub struct CampaignCreated {
    pub campaign: EmailCampaign,
    pub dispatch: CampaignDispatch,
}

#[derive(Serialize)]
pub struct CampaignDetail {
    pub campaign: EmailCampaign,
    pub recipients: Vec<CampaignRecipient>,
}

#[derive(Deserialize)]
pub struct UserQuery {
    pub user_id: String,
}

/// POST /api/email/campaign
///
/// Creates the campaign, then dispatches it right away.
pub async fn handle_create_campaign(
    State(state): State<AppState>,
    Json(req): Json<NewCampaign>,
) -> Result<Json<CampaignCreated>, AppError> {
    let campaign = req.validate()?;
    state.store.insert_campaign(&campaign).await?;

    let dispatch = dispatch_detached(&state, campaign.clone(), DispatchOptions::default()).await?;
    Ok(Json(CampaignCreated { campaign, dispatch }))
}

/// GET /api/email/campaigns?user_id=
pub async fn handle_list_campaigns(
    State(state): State<AppState>,
    Query(params): Query<UserQuery>,
) -> Result<Json<Vec<EmailCampaign>>, AppError> {
    Ok(Json(state.store.list_campaigns(&params.user_id).await?))
}

/// GET /api/email/campaign/:id
pub async fn handle_get_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CampaignDetail>, AppError> {
    let campaign = load_campaign(&state, id).await?;
    let recipients = state.store.list_recipients(id).await?;
    Ok(Json(CampaignDetail {
        campaign,
        recipients,
    }))
}

/// POST /api/email/campaign/:id/dispatch
pub async fn handle_dispatch_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    options: Option<Json<DispatchOptions>>,
) -> Result<Json<CampaignDispatch>, AppError> {
    let campaign = load_campaign(&state, id).await?;
    let options = options.map(|Json(o)| o).unwrap_or_default();
    let dispatch = dispatch_detached(&state, campaign, options).await?;
    Ok(Json(dispatch))
}

async fn load_campaign(state: &AppState, id: Uuid) -> Result<EmailCampaign, AppError> {
    state
        .store
        .get_campaign(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Campaign {id} not found")))
}

async fn dispatch_detached(
    state: &AppState,
    campaign: EmailCampaign,
    options: DispatchOptions,
) -> Result<CampaignDispatch, AppError> {
    let token = CancellationToken::new();
    let _cancel_on_drop = token.cancel_on_drop();

    let fanout = state.fanout.clone();
    let task_token = token.clone();
    run_detached(&token, state.batch_deadline, async move {
        fanout.dispatch(campaign, options, task_token).await
    })
    .await
    .map_err(|e| anyhow::anyhow!("campaign task failed: {e}"))?
}
