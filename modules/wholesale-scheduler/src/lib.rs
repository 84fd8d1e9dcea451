//! Scheduler (spec §4.8): recomputes `next_run_at` from each schedule's
//! recurrence rule, holds an external leader lease so only one process
//! dispatches a given schedule, and skips (never queues) a tick whose
//! supplier already has a job in flight.

pub mod error;
mod next_run;
pub mod registry;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wholesale_common::types::{CollectionJob, JobState, Schedule};
use wholesale_orchestrator::CollectionOrchestrator;
use wholesale_store::Store;

pub use error::SchedulerError;
pub use registry::{AdapterRegistry, StaticAdapterRegistry};

pub struct SchedulerConfig {
    pub lease_key: String,
    pub holder_id: String,
    pub lease_ttl: ChronoDuration,
    pub poll_interval: StdDuration,
}

pub struct Scheduler {
    store: Arc<Store>,
    orchestrator: Arc<CollectionOrchestrator>,
    registry: Arc<dyn AdapterRegistry>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(store: Arc<Store>, orchestrator: Arc<CollectionOrchestrator>, registry: Arc<dyn AdapterRegistry>, config: SchedulerConfig) -> Self {
        Self { store, orchestrator, registry, config }
    }

    /// Run the scheduler loop until `cancel` fires, polling on
    /// `config.poll_interval`.
    pub async fn run_forever(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("scheduler loop stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "scheduler tick failed");
                    }
                }
            }
        }
    }

    /// One scheduling pass: claim leadership, find due schedules, dispatch
    /// or skip each one. Safe to call repeatedly and concurrently from
    /// multiple processes — only the lease holder dispatches anything.
    pub async fn tick(&self) -> Result<(), SchedulerError> {
        let is_leader = self
            .store
            .acquire_leader_lease(&self.config.lease_key, &self.config.holder_id, self.config.lease_ttl)
            .await?;
        if !is_leader {
            return Ok(());
        }

        let now = Utc::now();
        let due = self.store.due_schedules(now).await?;

        // Dispatch every due schedule on its own task so suppliers due in
        // the same tick run concurrently rather than one after another.
        let mut handles = Vec::with_capacity(due.len());
        for schedule in due {
            let store = self.store.clone();
            let orchestrator = self.orchestrator.clone();
            let registry = self.registry.clone();
            handles.push(tokio::spawn(dispatch(store, orchestrator, registry, schedule)));
        }
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "failed to dispatch schedule"),
                Err(e) => warn!(error = %e, "dispatch task panicked"),
            }
        }
        Ok(())
    }
}

async fn dispatch(
    store: Arc<Store>,
    orchestrator: Arc<CollectionOrchestrator>,
    registry: Arc<dyn AdapterRegistry>,
    mut schedule: Schedule,
) -> Result<(), SchedulerError> {
    if store.has_active_job(&schedule.supplier_tag).await? {
        info!(schedule_id = %schedule.schedule_id, supplier = %schedule.supplier_tag, "skipping tick, collection already in flight");
        schedule.skipped_runs += 1;
        advance_and_save(&store, &mut schedule).await?;
        return Ok(());
    }

    let adapter = registry
        .adapter_for(&schedule.supplier_tag)
        .ok_or_else(|| SchedulerError::UnknownSupplier(schedule.supplier_tag.clone()))?;

    let job = CollectionJob::new(schedule.supplier_tag.clone(), schedule.mode, schedule.filters.clone(), schedule.max_products);
    schedule.total_runs += 1;

    let result = orchestrator.run_job(adapter, job, CancellationToken::new()).await;
    match result {
        Ok(finished) if finished.state == JobState::Completed => schedule.successful_runs += 1,
        Ok(finished) => {
            schedule.failed_runs += 1;
            schedule.last_error = finished.errors.as_slice().last().cloned();
        }
        Err(e) => {
            schedule.failed_runs += 1;
            schedule.last_error = Some(e.to_string());
        }
    }

    schedule.last_run_at = Some(Utc::now());
    advance_and_save(&store, &mut schedule).await?;
    Ok(())
}

async fn advance_and_save(store: &Store, schedule: &mut Schedule) -> Result<(), SchedulerError> {
    let from = schedule.last_run_at.unwrap_or_else(Utc::now);
    schedule.next_run_at = next_run::next_run_after(&schedule.rrule, &schedule.timezone, from);
    store.upsert_schedule(schedule).await?;
    Ok(())
}
