use anyhow::Context as _;

use ledgerq_api::config::{Config, JobStoreKind};
use ledgerq_api::context::{self, AppContext, SharedStore};
use ledgerq_jobs::InMemoryJobStore;
use ledgerq_ledger::{Contract, InMemoryNetwork};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    ledgerq_observability::init(config.log_directive());

    let store = job_store(&config).await?;

    let network = InMemoryNetwork::arc();
    let seed = network.contract(config.org1.msp_id.clone());
    seed.submit(&seed.create_transaction("InitLedger"), &[])
        .await
        .context("failed to initialise simulated ledger")?;
    let gateways = context::simulated_gateways(&config, &network);

    let port = config.port;
    let ctx = AppContext::start(config, store, gateways);
    let app = ledgerq_api::app::build_app(ctx.state());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind 0.0.0.0:{port}"))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(context::shutdown_signal(ctx.shutdown_token()))
        .await
        .context("server error")?;

    tracing::info!("shutting down");
    ctx.shutdown().await;
    Ok(())
}

async fn job_store(config: &Config) -> anyhow::Result<SharedStore> {
    match config.job_store {
        JobStoreKind::Memory => {
            let store: SharedStore = InMemoryJobStore::arc(config.retention);
            Ok(store)
        }
        JobStoreKind::Redis => redis_store(config).await,
    }
}

#[cfg(feature = "redis")]
async fn redis_store(config: &Config) -> anyhow::Result<SharedStore> {
    let store = ledgerq_jobs::RedisJobStore::connect(config.redis.url(), config.retention)
        .await
        .context("failed to connect to redis")?;
    Ok(std::sync::Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn redis_store(_config: &Config) -> anyhow::Result<SharedStore> {
    anyhow::bail!("JOB_STORE=redis requires the `redis` feature")
}
