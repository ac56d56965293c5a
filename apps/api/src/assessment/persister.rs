// Persister: insert-only writes of pipeline outputs. Each record gets a fresh
// UUID before the first attempt so a retried insert reuses the same id.

use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::db::RecordStore;
use crate::errors::AppError;
use crate::models::report::CreditReport;
use crate::retry::RetryPolicy;

pub async fn store_processed_data(
    store: &dyn RecordStore,
    retry: &RetryPolicy,
    data: &Value,
) -> Result<Uuid, AppError> {
    let id = Uuid::new_v4();
    retry
        .run("Storing processed data", || store.insert_processed_data(id, data))
        .await?;
    info!("Processed data stored successfully (id {id})");
    Ok(id)
}

pub async fn store_credit_report(
    store: &dyn RecordStore,
    retry: &RetryPolicy,
    report: &CreditReport,
) -> Result<Uuid, AppError> {
    let id = Uuid::new_v4();
    retry
        .run("Storing credit report", || {
            store.insert_credit_report(id, report.as_str())
        })
        .await?;
    info!("Credit report stored successfully (id {id})");
    Ok(id)
}
