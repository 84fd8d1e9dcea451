use thiserror::Error;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("rate limited by server, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("exhausted {attempts} retries, last error: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("request cancelled")]
    Cancelled,
}

impl HttpError {
    /// Whether a retry makes sense for this error (§4.2: 5xx, timeouts,
    /// connection resets and explicit rate-limit signals are transient;
    /// 4xx other than 429 is permanent).
    pub fn is_transient(&self) -> bool {
        match self {
            HttpError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            HttpError::Timeout(_) => true,
            HttpError::RateLimited { .. } => true,
            HttpError::Status { status, .. } => *status >= 500,
            HttpError::RetriesExhausted { .. } | HttpError::Cancelled => false,
        }
    }
}
