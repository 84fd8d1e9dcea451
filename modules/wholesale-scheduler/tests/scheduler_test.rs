//! End-to-end scheduler scenario against a real Postgres instance.
//!
//! Requirements: Docker (for Postgres via testcontainers)
//!
//! Run with: cargo test -p wholesale-scheduler --test scheduler_test

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;
use wholesale_adapters::{AdapterError, CollectionStats, ConnectionTestResult, StockInfo, SupplierAdapter, SupplierCategory};
use wholesale_common::types::{
    CollectionFilters, CollectionMode, ConnectionState, RawRecord, Schedule, SupplierAccount,
};
use wholesale_orchestrator::{CollectionOrchestrator, OrchestratorConfig};
use wholesale_scheduler::{Scheduler, SchedulerConfig, StaticAdapterRegistry};
use wholesale_store::testutil::postgres_store;

/// Sleeps for `delay_ms` before yielding one record, so a dispatched job
/// stays "in flight" long enough for a second tick to observe it.
struct SlowAdapter {
    delay_ms: u64,
}

#[async_trait]
impl SupplierAdapter for SlowAdapter {
    fn supplier_tag(&self) -> &str {
        "slow_supplier"
    }
    fn base_url(&self) -> &str {
        "https://mock.invalid"
    }
    fn rate_limit_per_minute(&self) -> u32 {
        60
    }
    async fn authenticate(&self) -> Result<(), AdapterError> {
        Ok(())
    }
    async fn test_connection(&self) -> Result<ConnectionTestResult, AdapterError> {
        Ok(ConnectionTestResult { connected: true, response_time_ms: 0, api_info: None, error: None })
    }
    async fn list_categories(&self) -> Result<Vec<SupplierCategory>, AdapterError> {
        Ok(Vec::new())
    }
    async fn collect(
        &self,
        _mode: CollectionMode,
        _filters: &CollectionFilters,
        _max_products: usize,
        tx: mpsc::Sender<RawRecord>,
    ) -> Result<CollectionStats, AdapterError> {
        tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        let record = RawRecord {
            supplier_tag: self.supplier_tag().to_string(),
            payload: serde_json::json!({
                "supplier_product_id": "p-1",
                "name": "Widget",
                "wholesale_price": 1000,
                "stock_quantity": 1,
                "in_stock": true,
            }),
            fetched_at: Utc::now(),
        };
        let _ = tx.send(record).await;
        Ok(CollectionStats { products_found: 1, products_yielded: 1 })
    }
    async fn fetch_detail(&self, _supplier_product_id: &str) -> Result<RawRecord, AdapterError> {
        Err(AdapterError::Parse("not implemented in mock".to_string()))
    }
    async fn fetch_stock(&self, _supplier_product_ids: &[String]) -> Result<std::collections::HashMap<String, StockInfo>, AdapterError> {
        Ok(std::collections::HashMap::new())
    }
}

#[tokio::test]
async fn overlapping_ticks_skip_rather_than_double_dispatch() {
    let (_container, store) = postgres_store().await;
    let store = Arc::new(store);

    store
        .upsert_account(&SupplierAccount {
            supplier_tag: "slow_supplier".to_string(),
            display_name: "Slow Supplier".to_string(),
            auth_material: Vec::new(),
            connection_state: ConnectionState::Connected,
            auto_collect: true,
            default_interval_secs: 3600,
            collect_categories: None,
            recent_window_days: 1,
            max_products_per_run: 10_000,
            last_connected_at: None,
            last_error: None,
        })
        .await
        .expect("seed supplier account");

    let schedule = Schedule {
        schedule_id: Uuid::new_v4(),
        supplier_tag: "slow_supplier".to_string(),
        name: "every hour".to_string(),
        rrule: "FREQ=HOURLY;INTERVAL=1".to_string(),
        timezone: "UTC".to_string(),
        mode: CollectionMode::All,
        filters: CollectionFilters::default(),
        max_products: 100,
        active: true,
        last_run_at: None,
        next_run_at: Some(Utc::now() - ChronoDuration::seconds(1)),
        total_runs: 0,
        successful_runs: 0,
        failed_runs: 0,
        skipped_runs: 0,
        last_error: None,
    };
    store.upsert_schedule(&schedule).await.expect("seed schedule");

    let mut registry = StaticAdapterRegistry::new();
    registry.register(Arc::new(SlowAdapter { delay_ms: 150 }));

    let orchestrator = Arc::new(CollectionOrchestrator::new(
        store.clone(),
        OrchestratorConfig { channel_capacity: 8, persistence_batch_size: 10, max_concurrent_persist_batches: 1 },
    ));
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        orchestrator,
        Arc::new(registry),
        SchedulerConfig {
            lease_key: "scheduler_leader".to_string(),
            holder_id: "test-holder".to_string(),
            lease_ttl: ChronoDuration::seconds(30),
            poll_interval: std::time::Duration::from_secs(1),
        },
    ));

    let s1 = scheduler.clone();
    let first = tokio::spawn(async move { s1.tick().await });
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    let s2 = scheduler.clone();
    let second = tokio::spawn(async move { s2.tick().await });

    first.await.expect("first tick task").expect("first tick");
    second.await.expect("second tick task").expect("second tick");

    let job_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM collection_jobs WHERE supplier_tag = $1")
        .bind("slow_supplier")
        .fetch_one(store.pool())
        .await
        .expect("count jobs");
    assert_eq!(job_count.0, 1, "the overlapping tick must not have dispatched a second job");
}
