use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Adapter(#[from] wholesale_adapters::AdapterError),

    #[error(transparent)]
    Normalize(#[from] wholesale_normalize::NormalizeError),

    #[error(transparent)]
    Store(#[from] wholesale_store::StoreError),

    #[error("a collection job for this supplier is already running")]
    AlreadyRunning,

    #[error("job cancelled")]
    Cancelled,
}
