use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::retry::Transient;

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Creates the two insert-only tables if they do not exist yet.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS processed_data (
            id UUID PRIMARY KEY,
            data JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS credit_reports (
            id UUID PRIMARY KEY,
            report TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    info!("Database schema initialized");
    Ok(())
}

/// Connection-level failures are worth another attempt; constraint or
/// query errors are not.
impl Transient for sqlx::Error {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            sqlx::Error::Io(_)
                | sqlx::Error::Tls(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::WorkerCrashed
        )
    }
}

/// Insert-only access to the hosted store. No reads, updates or deletes.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_processed_data(&self, id: Uuid, data: &Value) -> Result<(), sqlx::Error>;
    async fn insert_credit_report(&self, id: Uuid, report: &str) -> Result<(), sqlx::Error>;
}

#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert_processed_data(&self, id: Uuid, data: &Value) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO processed_data (id, data) VALUES ($1, $2)")
            .bind(id)
            .bind(data)
            .execute(&self.pool)
            .await?;
        debug!("Inserted processed_data {id}");
        Ok(())
    }

    async fn insert_credit_report(&self, id: Uuid, report: &str) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO credit_reports (id, report) VALUES ($1, $2)")
            .bind(id)
            .bind(report)
            .execute(&self.pool)
            .await?;
        debug!("Inserted credit_report {id}");
        Ok(())
    }
}
