//! Collection Orchestrator (spec §4.7): drives one `CollectionJob`
//! end-to-end over a bounded channel between the adapter (producer) and
//! normalize/filter/persist (consumer), per the design note that an
//! event-sourced engine is unnecessary for a single linear pipeline.

pub mod error;
pub mod filter;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};
use wholesale_adapters::SupplierAdapter;
use wholesale_common::types::{CollectionJob, JobState, RawRecord};
use wholesale_store::Store;

pub use error::OrchestratorError;

/// How often the progress ticker flushes job counters to the store when no
/// batch boundary has forced a flush on its own (§4.7 step 4).
const PROGRESS_TICK_INTERVAL: Duration = Duration::from_secs(5);

pub struct OrchestratorConfig {
    pub channel_capacity: usize,
    pub persistence_batch_size: usize,
    pub max_concurrent_persist_batches: usize,
}

impl From<&wholesale_common::Config> for OrchestratorConfig {
    fn from(config: &wholesale_common::Config) -> Self {
        Self {
            channel_capacity: config.pipeline_channel_capacity,
            persistence_batch_size: config.persistence_batch_size,
            max_concurrent_persist_batches: config.max_concurrent_persist_batches,
        }
    }
}

pub struct CollectionOrchestrator {
    store: Arc<Store>,
    config: OrchestratorConfig,
}

impl CollectionOrchestrator {
    pub fn new(store: Arc<Store>, config: OrchestratorConfig) -> Self {
        Self { store, config }
    }

    /// Run `job` against `adapter` to completion, cancellation, or a fatal
    /// error. Single-flight per `job.supplier_tag` is enforced against the
    /// store so two orchestrator processes never race the same supplier.
    pub async fn run_job(
        &self,
        adapter: Arc<dyn SupplierAdapter>,
        mut job: CollectionJob,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<CollectionJob, OrchestratorError> {
        if self.store.has_active_job(&job.supplier_tag).await? {
            return Err(OrchestratorError::AlreadyRunning);
        }

        job.state = JobState::Running;
        job.started_at = Some(Utc::now());
        match self.store.insert_job(&job).await {
            Ok(()) => {}
            Err(wholesale_store::StoreError::ActiveJobExists(_)) => return Err(OrchestratorError::AlreadyRunning),
            Err(e) => return Err(e.into()),
        }
        info!(job_id = %job.job_id, supplier = %job.supplier_tag, mode = %job.mode, "collection job started");

        let (tx, mut rx) = mpsc::channel::<RawRecord>(self.config.channel_capacity);
        let mode = job.mode;
        let filters = job.filters.clone();
        let max_products = job.max_products;
        let cancel_producer = cancel.clone();

        let producer = tokio::spawn(async move {
            tokio::select! {
                result = adapter.collect(mode, &filters, max_products, tx) => result,
                _ = cancel_producer.cancelled() => Err(wholesale_adapters::AdapterError::Cancelled),
            }
        });

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_persist_batches.max(1)));
        let mut batch = Vec::with_capacity(self.config.persistence_batch_size);
        let mut batch_handles = FuturesUnordered::new();
        let batch_size = self.config.persistence_batch_size.max(1);
        let mut progress_ticker = tokio::time::interval(PROGRESS_TICK_INTERVAL);
        progress_ticker.tick().await; // first tick fires immediately, skip it

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(job_id = %job.job_id, "collection cancelled mid-run");
                    break;
                }
                maybe = rx.recv() => {
                    match maybe {
                        Some(record) => {
                            batch.push(record);
                            if batch.len() >= batch_size {
                                let chunk = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                                batch_handles.push(tokio::spawn(persist_batch(
                                    self.store.clone(),
                                    chunk,
                                    job.filters.clone(),
                                    semaphore.clone(),
                                )));
                            }
                        }
                        None => break,
                    }
                }
                Some(result) = batch_handles.next(), if !batch_handles.is_empty() => {
                    apply_batch_outcome(&mut job, result);
                    self.store.update_job_progress(&job).await?;
                }
                _ = progress_ticker.tick() => {
                    self.store.update_job_progress(&job).await?;
                }
            }
        }
        if !batch.is_empty() {
            batch_handles.push(tokio::spawn(persist_batch(self.store.clone(), batch, job.filters.clone(), semaphore.clone())));
        }

        while let Some(result) = batch_handles.next().await {
            apply_batch_outcome(&mut job, result);
            self.store.update_job_progress(&job).await?;
        }

        let producer_outcome = producer.await;
        match producer_outcome {
            Ok(Ok(stats)) => {
                job.products_found = stats.products_found;
            }
            Ok(Err(wholesale_adapters::AdapterError::Cancelled)) => {
                job.errors.push("collection cancelled".to_string());
            }
            Ok(Err(e)) => {
                job.errors.push(e.to_string());
                if e.is_fatal_to_job() {
                    job.state = JobState::Failed;
                }
            }
            Err(e) => job.errors.push(format!("producer task panicked: {e}")),
        }

        job.finished_at = Some(Utc::now());
        if job.state != JobState::Failed {
            job.state = if cancel.is_cancelled() {
                JobState::Cancelled
            } else if job.products_failed > 0 && job.products_collected == 0 && job.products_updated == 0 {
                JobState::Failed
            } else {
                JobState::Completed
            };
        }
        self.store.update_job_progress(&job).await?;
        info!(
            job_id = %job.job_id,
            state = %job.state,
            found = job.products_found,
            collected = job.products_collected,
            updated = job.products_updated,
            "collection job finished"
        );
        Ok(job)
    }
}

struct BatchOutcome {
    inserted: u64,
    updated: u64,
    failed: u64,
    errors: Vec<String>,
}

fn apply_batch_outcome(job: &mut CollectionJob, result: Result<Result<BatchOutcome, OrchestratorError>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(outcome)) => {
            job.products_collected += outcome.inserted;
            job.products_updated += outcome.updated;
            job.products_failed += outcome.failed;
            for err in outcome.errors {
                job.errors.push(err);
            }
        }
        Ok(Err(e)) => job.errors.push(e.to_string()),
        Err(e) => job.errors.push(format!("persistence batch task panicked: {e}")),
    }
}

async fn persist_batch(
    store: Arc<Store>,
    records: Vec<RawRecord>,
    filters: wholesale_common::types::CollectionFilters,
    semaphore: Arc<Semaphore>,
) -> Result<BatchOutcome, OrchestratorError> {
    let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
    let mut failed = 0u64;
    let mut errors = Vec::new();
    let mut products = Vec::with_capacity(records.len());
    let now = Utc::now();
    for record in records {
        match wholesale_normalize::normalize(&record, None, now) {
            Ok(product) if filter::passes(&product, &filters) => products.push(product),
            Ok(_) => {}
            Err(e) => {
                failed += 1;
                errors.push(e.to_string());
            }
        }
    }
    let batch_len = products.len().max(1);
    let (inserted, updated, upsert_failed, upsert_errors) = store.bulk_upsert(&products, batch_len).await?;
    failed += upsert_failed;
    errors.extend(upsert_errors);
    Ok(BatchOutcome { inserted, updated, failed, errors })
}
