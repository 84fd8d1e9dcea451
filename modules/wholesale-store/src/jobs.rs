use wholesale_common::types::{CollectionJob, JobState};

use crate::error::StoreError;
use crate::Store;

impl Store {
    /// Insert a new job row. A supplier with a pending/running job already
    /// in flight trips `collection_jobs_one_active_per_supplier_idx` and is
    /// reported as `StoreError::ActiveJobExists` rather than a generic
    /// database error, so callers can tell a single-flight conflict apart
    /// from any other insert failure.
    pub async fn insert_job(&self, job: &CollectionJob) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO collection_jobs (
                job_id, supplier_tag, mode, filters, max_products, state,
                started_at, finished_at, products_found, products_collected,
                products_updated, products_failed, errors
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
            "#,
        )
        .bind(job.job_id)
        .bind(&job.supplier_tag)
        .bind(job.mode.to_string())
        .bind(serde_json::to_value(&job.filters).unwrap_or_default())
        .bind(job.max_products as i64)
        .bind(job.state.to_string())
        .bind(job.started_at)
        .bind(job.finished_at)
        .bind(job.products_found as i64)
        .bind(job.products_collected as i64)
        .bind(job.products_updated as i64)
        .bind(job.products_failed as i64)
        .bind(serde_json::to_value(job.errors.as_slice()).unwrap_or_default())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505") => {
                Err(StoreError::ActiveJobExists(job.supplier_tag.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the orchestrator's latest progress counters for an
    /// in-flight or completed job (§4.7 progress reporting).
    pub async fn update_job_progress(&self, job: &CollectionJob) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE collection_jobs SET
                state = $2, started_at = $3, finished_at = $4,
                products_found = $5, products_collected = $6,
                products_updated = $7, products_failed = $8, errors = $9
            WHERE job_id = $1
            "#,
        )
        .bind(job.job_id)
        .bind(job.state.to_string())
        .bind(job.started_at)
        .bind(job.finished_at)
        .bind(job.products_found as i64)
        .bind(job.products_collected as i64)
        .bind(job.products_updated as i64)
        .bind(job.products_failed as i64)
        .bind(serde_json::to_value(job.errors.as_slice()).unwrap_or_default())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Whether a non-terminal job already exists for `supplier_tag`
    /// (single-flight enforcement, §6).
    pub async fn has_active_job(&self, supplier_tag: &str) -> Result<bool, StoreError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM collection_jobs WHERE supplier_tag = $1 AND state IN ($2, $3)",
        )
        .bind(supplier_tag)
        .bind(JobState::Pending.to_string())
        .bind(JobState::Running.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0 > 0)
    }
}
