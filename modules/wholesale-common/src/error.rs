use thiserror::Error;

/// The error kinds the orchestrator classifies on (design §7). Every
/// component-local error type (`HttpError`, `AdapterError`, `StoreError`)
/// converts into one of these so the orchestrator never has to inspect a
/// stack to decide whether a job fails, retries, or continues.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("supplier rejected credentials: {0}")]
    AuthFailed(String),

    #[error("transient I/O error: {0}")]
    TransientIo(String),

    #[error("rate limited, retry after {retry_after_secs}s: {message}")]
    RateLimited { message: String, retry_after_secs: u64 },

    #[error("adapter could not parse a page: {0}")]
    SchemaMismatch(String),

    #[error("record failed normalization: {0}")]
    Normalize(String),

    #[error("persistence write failed: {0}")]
    Persistence(String),

    #[error("non-retryable request rejected: {0}")]
    Permanent(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IngestError {
    /// Whether this error is fatal to the whole job (vs. a single record).
    pub fn is_fatal_to_job(&self) -> bool {
        matches!(
            self,
            IngestError::AuthFailed(_) | IngestError::SchemaMismatch(_) | IngestError::Cancelled
        )
    }
}
