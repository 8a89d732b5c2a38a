use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::api::{
    handler::{create_job, get_last_report, health_check, list_unsettled_jobs, run_reconcile, AppState},
    models::{CreateJobRequest, ReconcileRequest},
};
use crate::middleware::validate_json;

pub fn create_app(state: AppState) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let app = Router::new()
        .route("/health", get(health_check))
        .nest(
            "/api/v1",
            Router::new()
                // Reconciliation
                .route(
                    "/reconcile",
                    post(run_reconcile).route_layer(middleware::from_fn(validate_json::<ReconcileRequest>)),
                )
                .route("/reconcile/last", get(get_last_report))
                // Jobs
                .route(
                    "/jobs",
                    post(create_job).route_layer(middleware::from_fn(validate_json::<CreateJobRequest>)),
                )
                .route("/jobs/unsettled", get(list_unsettled_jobs)),
        )
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

pub async fn run_server(app: Router, bind_address: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app).await
}
