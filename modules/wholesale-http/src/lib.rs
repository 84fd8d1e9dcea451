//! Rate-limited HTTP client (spec §4.2): one token bucket and bounded
//! in-flight count per host, full-jitter exponential backoff on transient
//! failures. Grounded in `apify-client`'s request/response shape.

pub mod client;
pub mod error;
pub mod token_bucket;

pub use client::{HostLimits, RateLimitedClient};
pub use error::HttpError;
