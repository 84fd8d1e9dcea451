//! End-to-end orchestrator scenarios against a real Postgres instance.
//!
//! Requirements: Docker (for Postgres via testcontainers)
//!
//! Run with: cargo test -p wholesale-orchestrator --test orchestrator_test

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wholesale_adapters::{AdapterError, CollectionStats, ConnectionTestResult, StockInfo, SupplierAdapter, SupplierCategory};
use wholesale_common::types::{
    CollectionFilters, CollectionJob, CollectionMode, ConnectionState, JobState, RawRecord, SupplierAccount,
};
use wholesale_orchestrator::{CollectionOrchestrator, OrchestratorConfig};
use wholesale_store::testutil::postgres_store;
use wholesale_store::Store;

fn sample_payload(id: u32) -> serde_json::Value {
    serde_json::json!({
        "supplier_product_id": format!("p-{id}"),
        "name": format!("Widget {id}"),
        "category_path": "Electronics",
        "wholesale_price": 1000 + id,
        "stock_quantity": 5,
        "in_stock": true,
    })
}

/// Streams `total` records in chunks of `chunk_size`, re-authenticating
/// once every `expires_after_chunks` chunks — standing in for a
/// short-lived-token adapter (e.g. `GraphQlAdapter`) whose reauth is
/// transparent to the orchestrator (§8 scenario 2).
struct TokenRefreshingAdapter {
    total: u32,
    chunk_size: u32,
    expires_after_chunks: u32,
    reauth_count: AtomicU32,
}

#[async_trait]
impl SupplierAdapter for TokenRefreshingAdapter {
    fn supplier_tag(&self) -> &str {
        "mock_graphql"
    }
    fn base_url(&self) -> &str {
        "https://mock.invalid"
    }
    fn rate_limit_per_minute(&self) -> u32 {
        120
    }
    async fn authenticate(&self) -> Result<(), AdapterError> {
        self.reauth_count.fetch_add(1, Ordering::SeqCst);
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
        max_products: usize,
        tx: mpsc::Sender<RawRecord>,
    ) -> Result<CollectionStats, AdapterError> {
        self.authenticate().await?;
        let mut sent = 0u32;
        let mut chunks_sent = 0u32;
        while sent < self.total && (sent as usize) < max_products {
            for _ in 0..self.chunk_size.min(self.total - sent) {
                let record = RawRecord { supplier_tag: self.supplier_tag().to_string(), payload: sample_payload(sent), fetched_at: Utc::now() };
                if tx.send(record).await.is_err() {
                    return Ok(CollectionStats { products_found: self.total as u64, products_yielded: sent as u64 });
                }
                sent += 1;
            }
            chunks_sent += 1;
            if chunks_sent % self.expires_after_chunks == 0 {
                self.authenticate().await?;
            }
        }
        Ok(CollectionStats { products_found: self.total as u64, products_yielded: sent as u64 })
    }
    async fn fetch_detail(&self, _supplier_product_id: &str) -> Result<RawRecord, AdapterError> {
        Err(AdapterError::Parse("not implemented in mock".to_string()))
    }
    async fn fetch_stock(&self, _supplier_product_ids: &[String]) -> Result<std::collections::HashMap<String, StockInfo>, AdapterError> {
        Ok(std::collections::HashMap::new())
    }
}

/// Streams records forever (bounded only by `max_products`), counting how
/// many it managed to push before the channel closes out from under it —
/// used to exercise cancellation mid-run (§8 scenario 4).
struct EndlessAdapter {
    sent: AtomicU64,
}

#[async_trait]
impl SupplierAdapter for EndlessAdapter {
    fn supplier_tag(&self) -> &str {
        "mock_endless"
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
        max_products: usize,
        tx: mpsc::Sender<RawRecord>,
    ) -> Result<CollectionStats, AdapterError> {
        let mut i = 0u32;
        while (i as usize) < max_products {
            let record = RawRecord { supplier_tag: self.supplier_tag().to_string(), payload: sample_payload(i), fetched_at: Utc::now() };
            if tx.send(record).await.is_err() {
                break;
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
            i += 1;
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        Ok(CollectionStats { products_found: max_products as u64, products_yielded: i as u64 })
    }
    async fn fetch_detail(&self, _supplier_product_id: &str) -> Result<RawRecord, AdapterError> {
        Err(AdapterError::Parse("not implemented in mock".to_string()))
    }
    async fn fetch_stock(&self, _supplier_product_ids: &[String]) -> Result<std::collections::HashMap<String, StockInfo>, AdapterError> {
        Ok(std::collections::HashMap::new())
    }
}

async fn seed_account(store: &Store, supplier_tag: &str) {
    store
        .upsert_account(&SupplierAccount {
            supplier_tag: supplier_tag.to_string(),
            display_name: supplier_tag.to_string(),
            auth_material: Vec::new(),
            connection_state: ConnectionState::Connected,
            auto_collect: false,
            default_interval_secs: 3600,
            collect_categories: None,
            recent_window_days: 1,
            max_products_per_run: 10_000,
            last_connected_at: None,
            last_error: None,
        })
        .await
        .expect("seed supplier account");
}

fn orchestrator(store: Arc<Store>) -> CollectionOrchestrator {
    CollectionOrchestrator::new(
        store,
        OrchestratorConfig { channel_capacity: 32, persistence_batch_size: 20, max_concurrent_persist_batches: 2 },
    )
}

#[tokio::test]
async fn graphql_style_token_refresh_is_transparent_to_the_orchestrator() {
    let (_container, store) = postgres_store().await;
    let store = Arc::new(store);
    seed_account(&store, "mock_graphql").await;

    let adapter: Arc<dyn SupplierAdapter> =
        Arc::new(TokenRefreshingAdapter { total: 300, chunk_size: 100, expires_after_chunks: 2, reauth_count: AtomicU32::new(0) });
    let job = CollectionJob::new("mock_graphql".to_string(), CollectionMode::All, CollectionFilters::default(), 300);

    let finished = orchestrator(store).run_job(adapter.clone(), job, CancellationToken::new()).await.expect("job runs");

    assert_eq!(finished.state, JobState::Completed);
    assert_eq!(finished.products_collected, 300);
}

#[tokio::test]
async fn cancellation_mid_run_reaches_cancelled_state_promptly() {
    let (_container, store) = postgres_store().await;
    let store = Arc::new(store);
    seed_account(&store, "mock_endless").await;

    let adapter: Arc<dyn SupplierAdapter> = Arc::new(EndlessAdapter { sent: AtomicU64::new(0) });
    let job = CollectionJob::new("mock_endless".to_string(), CollectionMode::All, CollectionFilters::default(), 10_000);
    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel_clone.cancel();
    });

    let finished = orchestrator(store).run_job(adapter, job, cancel).await.expect("job runs");
    assert_eq!(finished.state, JobState::Cancelled);
    assert!(finished.products_collected < 10_000, "cancellation should have cut the run short");
}
