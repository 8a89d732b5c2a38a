mod api;
mod bootstrap;
mod config;
mod deals;
mod error;
mod jobs;
mod ledger;
mod middleware;
mod server;
mod settlement;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::settlement::PassScheduler;

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,deal_settler=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    info!("🚀 Starting deal settler");

    let config = Config::from_env()?;
    let state = bootstrap::initialize_app_state(&config).await?;

    match config.schedule_interval() {
        Some(every) => {
            PassScheduler::new(state.reconciler.clone(), every).start();
        }
        None => info!("Scheduled passes disabled; use POST /api/v1/reconcile"),
    }

    let app = server::create_app(state);
    server::run_server(app, &config.bind_address).await?;

    Ok(())
}
