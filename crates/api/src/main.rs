use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tribunal_api::config::{LogFormat, ServerConfig, StoreBackend};
use tribunal_api::router::build_app_router;
use tribunal_api::state::AppState;
use tribunal_core::permissions::PermissionResolver;
use tribunal_db::store::{JsonFileStore, PgProposalStore, ProposalStore};
use tribunal_events::{EventBus, WebhookDelivery, WebhookNotifier};
use tribunal_pipeline::{
    HttpContentGateway, IntegrationPipeline, MemoryRunRecorder, PgRunRecorder, RunRecorder,
};

const DEFAULT_LOG_FILTER: &str = "tribunal_api=debug,tribunal_pipeline=debug,\
tribunal_events=debug,tribunal_db=debug,tower_http=debug";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    match LogFormat::from_env() {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let authority = config.authority_config();
    if authority.authority_count() == 0 {
        tracing::warn!("No authority identities configured, proposals can never be approved");
    }
    let resolver = Arc::new(PermissionResolver::new(authority));

    // --- Proposal store ---
    let mut pool = None;
    let store: Arc<dyn ProposalStore> = match &config.store {
        StoreBackend::Json { path } => Arc::new(
            JsonFileStore::open(path.clone())
                .await
                .expect("Failed to open JSON proposal store"),
        ),
        StoreBackend::Postgres { database_url } => {
            let db = tribunal_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            tribunal_db::health_check(&db)
                .await
                .expect("Database health check failed");
            tribunal_db::run_migrations(&db)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            pool = Some(db.clone());
            Arc::new(PgProposalStore::new(db))
        }
    };
    tracing::info!(backend = store.backend_name(), "Proposal store ready");

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let background_cancel = CancellationToken::new();
    let mut background = Vec::new();

    // --- Integration pipeline ---
    let pipeline = match &config.integration {
        Some(integration) => {
            let gateway = HttpContentGateway::new(
                integration.submit_url.clone(),
                integration.inject_url.clone(),
                Duration::from_secs(integration.timeout_secs),
            )
            .expect("Failed to build content API client");
            let recorder: Arc<dyn RunRecorder> = match &pool {
                Some(pool) => Arc::new(PgRunRecorder::new(pool.clone())),
                None => Arc::new(MemoryRunRecorder::new()),
            };
            let pipeline = Arc::new(
                IntegrationPipeline::new(Arc::new(gateway), recorder)
                    .with_event_bus(Arc::clone(&event_bus)),
            );

            background.push(tokio::spawn(Arc::clone(&pipeline).listen(
                Arc::clone(&store),
                event_bus.subscribe(),
                background_cancel.clone(),
            )));
            tracing::info!("Integration pipeline started");
            Some(pipeline)
        }
        None => {
            tracing::info!("Content API not configured, integration pipeline disabled");
            None
        }
    };

    // --- Webhook notifier ---
    if !config.notify_webhook_urls.is_empty() {
        let delivery = WebhookDelivery::new().expect("Failed to build webhook client");
        let notifier = WebhookNotifier::new(delivery, config.notify_webhook_urls.clone());
        background.push(tokio::spawn(
            notifier.run(event_bus.subscribe(), background_cancel.clone()),
        ));
        tracing::info!(
            endpoints = config.notify_webhook_urls.len(),
            "Webhook notifier started"
        );
    }

    // --- App state ---
    let state = AppState {
        store,
        config: Arc::new(config.clone()),
        resolver,
        event_bus: Arc::clone(&event_bus),
        pipeline,
        pool,
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, draining background tasks");

    background_cancel.cancel();
    let drain = async {
        for handle in background {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(Duration::from_secs(config.shutdown_timeout_secs), drain)
        .await
        .is_err()
    {
        tracing::warn!("Background tasks did not finish before the shutdown timeout");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
