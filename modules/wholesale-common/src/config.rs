use std::env;

/// Process-wide configuration loaded from environment variables.
///
/// Per-supplier credentials are *not* here — they live in
/// `SupplierAccount::auth_material` and are loaded from the encrypted
/// credential store, not the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,

    /// Default requests-per-second ceiling applied to a host when the
    /// adapter declares none of its own.
    pub default_rps: f64,
    /// Default bounded retry count for transient HTTP errors.
    pub default_max_retries: u32,
    /// Backoff ceiling for retry jitter.
    pub retry_backoff_ceiling_secs: u64,

    /// Channel capacity between the adapter producer and the
    /// normalize/persist consumer — the backpressure knob (design §9).
    pub pipeline_channel_capacity: usize,
    /// Persistence batch size (§4.5 `bulk_upsert`).
    pub persistence_batch_size: usize,
    /// Max concurrent persistence batches per job (§4.7).
    pub max_concurrent_persist_batches: usize,

    /// External lease used to elect a single scheduler leader (§6).
    pub scheduler_lease_key: String,
    pub scheduler_lease_ttl_secs: u64,
}

impl Config {
    /// Load configuration from environment variables. Panics with a clear
    /// message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            default_rps: env_parse_or("DEFAULT_RPS", 5.0),
            default_max_retries: env_parse_or("DEFAULT_MAX_RETRIES", 3),
            retry_backoff_ceiling_secs: env_parse_or("RETRY_BACKOFF_CEILING_SECS", 30),
            pipeline_channel_capacity: env_parse_or("PIPELINE_CHANNEL_CAPACITY", 256),
            persistence_batch_size: env_parse_or("PERSISTENCE_BATCH_SIZE", 100),
            max_concurrent_persist_batches: env_parse_or("MAX_CONCURRENT_PERSIST_BATCHES", 2),
            scheduler_lease_key: env::var("SCHEDULER_LEASE_KEY")
                .unwrap_or_else(|_| "scheduler_leader".to_string()),
            scheduler_lease_ttl_secs: env_parse_or("SCHEDULER_LEASE_TTL_SECS", 30),
        }
    }

    /// Log non-sensitive configuration at startup. `database_url` is
    /// redacted to its scheme and host only.
    pub fn log_redacted(&self) {
        tracing::info!(
            database = %redact_url(&self.database_url),
            default_rps = self.default_rps,
            pipeline_channel_capacity = self.pipeline_channel_capacity,
            persistence_batch_size = self.persistence_batch_size,
            "loaded configuration"
        );
    }
}

fn redact_url(url: &str) -> String {
    match url.find("://") {
        Some(idx) => {
            let (scheme, rest) = url.split_at(idx + 3);
            let host = rest.split('@').last().unwrap_or(rest);
            format!("{scheme}{host}")
        }
        None => "(unparseable)".to_string(),
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
