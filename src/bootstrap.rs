use std::{sync::Arc, time::Duration};

use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use crate::{
    api::handler::AppState,
    config::Config,
    deals::{StatusProvider, W3sStatusProvider},
    error::AppResult,
    jobs::{JobStore, PgJobStore},
    ledger::{LedgerClient, RpcLedgerClient, RpcLedgerConfig},
    settlement::{Reconciler, ReconcilerSettings},
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    let pool = initialize_database(&config.database_url).await?;
    let jobs: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool));

    let status: Arc<dyn StatusProvider> = Arc::new(W3sStatusProvider::new(
        config.status_api_url.clone(),
        config.status_api_token.clone(),
    ));
    info!("✅ Status provider: {} at {}", status.name(), config.status_api_url);

    let ledger: Arc<dyn LedgerClient> = Arc::new(RpcLedgerClient::new(RpcLedgerConfig {
        rpc_url: config.ledger_rpc_url.clone(),
        contract: config.contract_address,
        signer: config.signer.clone(),
        chain_id: config.chain_id,
        receipt_timeout: config.receipt_timeout(),
        receipt_poll_interval: config.receipt_poll_interval(),
    }));
    info!(
        "✅ Ledger client: contract {} on chain {}, sender {}",
        config.contract_address,
        config.chain_id,
        config.signer.address()
    );

    let settings = ReconcilerSettings::from(config);
    let reconciler = Reconciler::new(jobs.clone(), status.clone(), ledger, settings);
    info!(
        "✅ Reconciler ready (window {}, deadline {}s, simulated {})",
        settings.recent_facts_window,
        settings.pass_deadline.as_secs(),
        settings.simulated
    );

    Ok(AppState {
        reconciler,
        jobs,
        status_provider: status.name(),
    })
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
