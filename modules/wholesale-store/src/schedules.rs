use chrono::{DateTime, Utc};
use sqlx::FromRow;
use wholesale_common::types::{CollectionMode, Schedule};

use crate::error::StoreError;
use crate::Store;

#[derive(FromRow)]
struct ScheduleRow {
    schedule_id: uuid::Uuid,
    supplier_tag: String,
    name: String,
    rrule: String,
    timezone: String,
    mode: String,
    filters: serde_json::Value,
    max_products: i64,
    active: bool,
    last_run_at: Option<DateTime<Utc>>,
    next_run_at: Option<DateTime<Utc>>,
    total_runs: i64,
    successful_runs: i64,
    failed_runs: i64,
    skipped_runs: i64,
    last_error: Option<String>,
}

impl ScheduleRow {
    fn into_schedule(self) -> Result<Schedule, StoreError> {
        Ok(Schedule {
            schedule_id: self.schedule_id,
            supplier_tag: self.supplier_tag,
            name: self.name,
            rrule: self.rrule,
            timezone: self.timezone,
            mode: self.mode.parse::<CollectionMode>().map_err(StoreError::Decode)?,
            filters: serde_json::from_value(self.filters).map_err(|e| StoreError::Decode(e.to_string()))?,
            max_products: self.max_products.max(0) as usize,
            active: self.active,
            last_run_at: self.last_run_at,
            next_run_at: self.next_run_at,
            total_runs: self.total_runs.max(0) as u64,
            successful_runs: self.successful_runs.max(0) as u64,
            failed_runs: self.failed_runs.max(0) as u64,
            skipped_runs: self.skipped_runs.max(0) as u64,
            last_error: self.last_error,
        })
    }
}

impl Store {
    pub async fn upsert_schedule(&self, schedule: &Schedule) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO schedules (
                schedule_id, supplier_tag, name, rrule, timezone, mode, filters,
                max_products, active, last_run_at, next_run_at, total_runs,
                successful_runs, failed_runs, skipped_runs, last_error
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)
            ON CONFLICT (schedule_id) DO UPDATE SET
                name = EXCLUDED.name, rrule = EXCLUDED.rrule, timezone = EXCLUDED.timezone,
                mode = EXCLUDED.mode, filters = EXCLUDED.filters, max_products = EXCLUDED.max_products,
                active = EXCLUDED.active, last_run_at = EXCLUDED.last_run_at,
                next_run_at = EXCLUDED.next_run_at, total_runs = EXCLUDED.total_runs,
                successful_runs = EXCLUDED.successful_runs, failed_runs = EXCLUDED.failed_runs,
                skipped_runs = EXCLUDED.skipped_runs, last_error = EXCLUDED.last_error
            "#,
        )
        .bind(schedule.schedule_id)
        .bind(&schedule.supplier_tag)
        .bind(&schedule.name)
        .bind(&schedule.rrule)
        .bind(&schedule.timezone)
        .bind(schedule.mode.to_string())
        .bind(serde_json::to_value(&schedule.filters).unwrap_or_default())
        .bind(schedule.max_products as i64)
        .bind(schedule.active)
        .bind(schedule.last_run_at)
        .bind(schedule.next_run_at)
        .bind(schedule.total_runs as i64)
        .bind(schedule.successful_runs as i64)
        .bind(schedule.failed_runs as i64)
        .bind(schedule.skipped_runs as i64)
        .bind(&schedule.last_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Schedules due to run now, ordered so the caller can claim them in a
    /// stable order (earliest-due first).
    pub async fn due_schedules(&self, now: DateTime<Utc>) -> Result<Vec<Schedule>, StoreError> {
        let rows: Vec<ScheduleRow> = sqlx::query_as(
            "SELECT * FROM schedules WHERE active AND next_run_at <= $1 ORDER BY next_run_at ASC",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ScheduleRow::into_schedule).collect()
    }
}
