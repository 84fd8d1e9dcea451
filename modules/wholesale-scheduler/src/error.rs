use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] wholesale_store::StoreError),

    #[error(transparent)]
    Orchestrator(#[from] wholesale_orchestrator::OrchestratorError),

    #[error("no adapter registered for supplier `{0}`")]
    UnknownSupplier(String),
}
