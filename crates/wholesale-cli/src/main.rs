use std::env;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use wholesale_adapters::{GraphQlAdapter, KeyedRestAdapter, SupplierAdapter, XmlAdapter};
use wholesale_common::types::{CollectionFilters, CollectionJob, CollectionMode};
use wholesale_common::Config;
use wholesale_http::{HostLimits, RateLimitedClient};
use wholesale_orchestrator::{CollectionOrchestrator, OrchestratorConfig};
use wholesale_scheduler::{Scheduler, SchedulerConfig, StaticAdapterRegistry};
use wholesale_store::Store;

#[derive(Parser)]
#[command(name = "wholesale-cli", about = "Multi-source wholesale product ingestion engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single collection job against one supplier and exit.
    Collect {
        #[arg(long)]
        supplier: String,
        #[arg(long, default_value = "all")]
        mode: String,
        #[arg(long, default_value_t = 10_000)]
        max_products: usize,
    },
    /// Verify credentials and reachability for one supplier.
    TestConnection {
        #[arg(long)]
        supplier: String,
    },
    /// Run the recurring scheduler loop until interrupted.
    RunScheduler,
    /// Recompute duplicate groups over the whole catalog.
    Dedup {
        #[arg(long)]
        supplier: Option<String>,
        #[arg(long, default_value_t = wholesale_dedup::DEFAULT_THRESHOLD)]
        threshold: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let config = Config::from_env();
    config.log_redacted();

    let store = Arc::new(Store::connect(&config.database_url).await?);
    store.migrate().await?;

    // One process-wide rate-limited client (DESIGN NOTES §9): every adapter
    // shares it, so a host's bucket and in-flight semaphore are enforced
    // across the whole process, not per adapter instance.
    let client = Arc::new(RateLimitedClient::new(HostLimits::default()));

    let cli = Cli::parse();
    match cli.command {
        Command::Collect { supplier, mode, max_products } => {
            run_collect(store, &config, client, &supplier, &mode, max_products).await?;
        }
        Command::TestConnection { supplier } => {
            run_test_connection(client, &supplier).await?;
        }
        Command::RunScheduler => {
            run_scheduler(store, &config, client).await?;
        }
        Command::Dedup { supplier, threshold } => {
            run_dedup(store, supplier, threshold).await?;
        }
    }

    Ok(())
}

/// Build an adapter for `supplier_tag` from its type-specific environment
/// variables, the way `WholesalerManager` looked up a wholesaler class by
/// type and constructed it from stored credentials. Registers the
/// adapter's declared rate limit (§4.2) with `client` before returning it,
/// so every request against that host is throttled to the ceiling the
/// adapter itself reports rather than the client's generic default.
async fn build_adapter(supplier_tag: &str, client: Arc<RateLimitedClient>) -> anyhow::Result<Arc<dyn SupplierAdapter>> {
    let adapter: Arc<dyn SupplierAdapter> = match supplier_tag {
        "zentrade" => {
            let id = env::var("ZENTRADE_ID")?;
            let skey = env::var("ZENTRADE_M_SKEY")?;
            Arc::new(XmlAdapter::new(supplier_tag, id, skey, client.clone()))
        }
        "ownerclan" => {
            let username = env::var("OWNERCLAN_USERNAME")?;
            let password = env::var("OWNERCLAN_PASSWORD")?;
            Arc::new(GraphQlAdapter::new(supplier_tag, username, password, client.clone()))
        }
        "domeggook" => {
            let api_key = env::var("DOMEGGOOK_API_KEY")?;
            Arc::new(KeyedRestAdapter::new(supplier_tag, api_key, client.clone()))
        }
        other => anyhow::bail!("no adapter registered for supplier `{other}`"),
    };

    if let Some(host) = reqwest::Url::parse(adapter.base_url()).ok().and_then(|u| u.host_str().map(str::to_string)) {
        let limits = HostLimits::from_per_minute(adapter.rate_limit_per_minute());
        client.configure_host(&host, limits).await;
    }

    Ok(adapter)
}

async fn run_collect(store: Arc<Store>, config: &Config, client: Arc<RateLimitedClient>, supplier: &str, mode: &str, max_products: usize) -> anyhow::Result<()> {
    let mode: CollectionMode = mode.parse().map_err(anyhow::Error::msg)?;
    let adapter = build_adapter(supplier, client).await?;
    let orchestrator = CollectionOrchestrator::new(store, OrchestratorConfig::from(config));
    let job = CollectionJob::new(supplier.to_string(), mode, CollectionFilters::default(), max_products);
    let finished = orchestrator.run_job(adapter, job, CancellationToken::new()).await?;
    info!(
        state = %finished.state,
        found = finished.products_found,
        collected = finished.products_collected,
        updated = finished.products_updated,
        success_rate = finished.success_rate(),
        "collection finished"
    );
    Ok(())
}

async fn run_test_connection(client: Arc<RateLimitedClient>, supplier: &str) -> anyhow::Result<()> {
    let adapter = build_adapter(supplier, client).await?;
    let result = adapter.test_connection().await?;
    if result.connected {
        info!(response_time_ms = result.response_time_ms, "connection ok");
    } else {
        error!(error = ?result.error, "connection failed");
    }
    Ok(())
}

async fn run_scheduler(store: Arc<Store>, config: &Config, client: Arc<RateLimitedClient>) -> anyhow::Result<()> {
    let orchestrator = Arc::new(CollectionOrchestrator::new(store.clone(), OrchestratorConfig::from(config)));

    let mut registry = StaticAdapterRegistry::new();
    for supplier_tag in ["zentrade", "ownerclan", "domeggook"] {
        match build_adapter(supplier_tag, client.clone()).await {
            Ok(adapter) => registry.register(adapter),
            Err(e) => info!(supplier = supplier_tag, error = %e, "supplier not configured, skipping"),
        }
    }

    let scheduler = Scheduler::new(
        store,
        orchestrator,
        Arc::new(registry),
        SchedulerConfig {
            lease_key: config.scheduler_lease_key.clone(),
            holder_id: format!("wholesale-cli-{}", uuid::Uuid::new_v4()),
            lease_ttl: chrono::Duration::seconds(config.scheduler_lease_ttl_secs as i64),
            poll_interval: std::time::Duration::from_secs(30),
        },
    );

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });

    scheduler.run_forever(cancel).await;
    Ok(())
}

async fn run_dedup(store: Arc<Store>, supplier: Option<String>, threshold: f64) -> anyhow::Result<()> {
    let products = store.load_products_for_dedup(supplier.as_deref()).await?;
    info!(product_count = products.len(), threshold, "scoring duplicate candidates");
    let groups = wholesale_dedup::find_duplicate_groups(&products, threshold);
    info!(group_count = groups.len(), "duplicate groups found");
    store.replace_duplicate_groups(&groups).await?;
    Ok(())
}
