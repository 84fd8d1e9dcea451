use thiserror::Error;
use wholesale_http::HttpError;

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("could not parse supplier response: {0}")]
    Parse(String),

    #[error("supplier graphql error: {0}")]
    GraphQl(String),

    #[error("collection cancelled")]
    Cancelled,
}

impl AdapterError {
    pub fn is_fatal_to_job(&self) -> bool {
        matches!(self, AdapterError::AuthFailed(_) | AdapterError::Cancelled)
    }
}
