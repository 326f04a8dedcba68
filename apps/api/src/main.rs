mod applications;
mod collaborators;
mod config;
mod db;
mod delivery;
mod errors;
mod jobs;
mod ledger;
mod llm_client;
mod models;
mod outreach;
mod pool;
mod resumes;
mod routes;
mod state;
mod store;
#[cfg(test)]
mod testing;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::applications::orchestrator::ApplicationOrchestrator;
use crate::collaborators::archive::{FileArchive, S3Archive};
use crate::collaborators::catalog::PgJobCatalog;
use crate::collaborators::llm::LlmCollaborator;
use crate::config::{Config, LedgerBackend, S3Config};
use crate::db::create_pool;
use crate::delivery::dispatcher::MailDispatcher;
use crate::delivery::transport::{HttpMailTransport, LogTransport, MailTransport};
use crate::ledger::postgres::PgLedger;
use crate::ledger::redis::RedisLedger;
use crate::ledger::IdempotencyLedger;
use crate::llm_client::LlmClient;
use crate::outreach::fanout::CampaignFanout;
use crate::pool::WorkerPool;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::postgres::PgStore;
use crate::store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting HireFlow API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL (schema migrations run here)
    let db = create_pool(&config.database_url).await?;
    let store: Arc<dyn Store> = Arc::new(PgStore::new(db.clone()));

    // Idempotency ledger
    let ledger: Arc<dyn IdempotencyLedger> = match config.ledger_backend {
        LedgerBackend::Postgres => Arc::new(PgLedger::new(db.clone())),
        LedgerBackend::Redis => {
            let url = config.redis_url.clone().unwrap_or_default();
            let client = redis::Client::open(url)?;
            Arc::new(RedisLedger::connect(&client).await?)
        }
    };
    info!("Idempotency ledger: {:?}", config.ledger_backend);

    // Mail transport
    let transport: Arc<dyn MailTransport> = match &config.mail {
        Some(mail) => {
            info!("Mail transport: HTTP API at {}", mail.api_url);
            Arc::new(HttpMailTransport::new(
                mail.api_url.clone(),
                mail.api_key.clone(),
                mail.from.clone(),
            )?)
        }
        None => {
            warn!("MAIL_API_URL is not set; outbound email will only be logged");
            Arc::new(LogTransport)
        }
    };
    let dispatcher = Arc::new(MailDispatcher::new(transport, config.retry_policy()));

    // Shared worker pool for batches and campaigns
    let pool = WorkerPool::new(config.worker_concurrency);
    info!("Worker pool size: {}", pool.size());

    // Initialize LLM-backed collaborators
    let llm = LlmClient::new(config.anthropic_api_key.clone())?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);
    let llm_collaborator = Arc::new(LlmCollaborator::new(llm));
    let catalog = Arc::new(PgJobCatalog::new(db.clone()));

    // Initialize S3 / MinIO archive for uploads, when configured
    let archive: Option<Arc<dyn FileArchive>> = match &config.s3 {
        Some(s3) => {
            let client = build_s3_client(s3).await;
            info!("S3 archive enabled (bucket: {})", s3.bucket);
            Some(Arc::new(S3Archive::new(client, s3.bucket.clone())))
        }
        None => {
            info!("S3_BUCKET is not set; uploads will not be archived");
            None
        }
    };

    let orchestrator = ApplicationOrchestrator::new(
        store.clone(),
        ledger.clone(),
        catalog.clone(),
        llm_collaborator.clone(),
        dispatcher.clone(),
        pool.clone(),
    );
    let fanout = CampaignFanout::new(store.clone(), ledger, dispatcher, pool);

    // Build app state
    let state = AppState {
        store,
        jobs: catalog,
        writer: llm_collaborator.clone(),
        analyzer: llm_collaborator.clone(),
        parser: llm_collaborator,
        archive,
        orchestrator,
        fanout,
        batch_deadline: config.batch_deadline(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the frontend host is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &S3Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.access_key_id,
        &config.secret_access_key,
        None,
        None,
        "hireflow-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
