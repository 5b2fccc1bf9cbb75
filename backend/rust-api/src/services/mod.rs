use crate::config::Config;
use axum::http::StatusCode;
use mongodb::{bson::doc, Client as MongoClient, Database, IndexModel};
use redis::aio::ConnectionManager;
use thiserror::Error;

/// Settlement error taxonomy. Lifecycle conflicts are terminal for the
/// question; `ConcurrentConflict` is transient and safe to retry end-to-end.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Question not found")]
    NotFound,
    #[error("Question is not active")]
    Inactive,
    #[error("Question has expired")]
    Expired,
    #[error("Question already has all its winners")]
    Completed,
    #[error("Answer already submitted for this question")]
    AlreadyAttempted,
    #[error("Allocation conflict, please retry the submission")]
    ConcurrentConflict,
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl SettlementError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SettlementError::NotFound => StatusCode::NOT_FOUND,
            SettlementError::Inactive | SettlementError::Completed => StatusCode::CONFLICT,
            SettlementError::Expired => StatusCode::GONE,
            SettlementError::AlreadyAttempted => StatusCode::CONFLICT,
            SettlementError::ConcurrentConflict => StatusCode::SERVICE_UNAVAILABLE,
            SettlementError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub struct AppState {
    pub config: Config,
    pub mongo: Database,
    pub redis: ConnectionManager,
    pub http: reqwest::Client,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        ensure_indexes(&mongo).await?;

        tracing::info!("Attempting to connect to Redis...");

        let redis = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        // Test connection
        let mut conn = redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.payout_timeout_secs))
            .build()?;

        Ok(Self {
            config,
            mongo,
            redis,
            http,
        })
    }
}

/// The unique indexes are the actual idempotency and one-slot-per-user
/// gates; the services assume they exist.
pub async fn ensure_indexes(mongo: &Database) -> anyhow::Result<()> {
    let attempt_index = IndexModel::builder()
        .keys(doc! { "user_id": 1, "question_id": 1 })
        .options(
            mongodb::options::IndexOptions::builder()
                .unique(true)
                .build(),
        )
        .build();
    mongo
        .collection::<crate::models::attempt::Attempt>(attempt_store::COLLECTION)
        .create_index(attempt_index)
        .await?;

    let winner_index = IndexModel::builder()
        .keys(doc! { "question_id": 1, "user_id": 1 })
        .options(
            mongodb::options::IndexOptions::builder()
                .unique(true)
                .build(),
        )
        .build();
    mongo
        .collection::<crate::models::winner::Winner>(winner_allocator::WINNERS_COLLECTION)
        .create_index(winner_index)
        .await?;

    tracing::info!("MongoDB unique indexes ensured");
    Ok(())
}

/// MongoDB duplicate key violation (error code 11000) on a unique index.
pub fn is_duplicate_key_error(err: &mongodb::error::Error) -> bool {
    if let mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(ref we)) =
        *err.kind
    {
        return we.code == 11000;
    }
    false
}

pub mod attempt_store;
pub mod notification_publisher;
pub mod payout_dispatcher;
pub mod points_ledger;
pub mod question_registry;
pub mod settlement_service;
pub mod winner_allocator;
