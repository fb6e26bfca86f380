use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_probe_routes;
use admissions::config::AppConfig;
use admissions::error::AppError;
use admissions::telemetry;
use admissions::workflows::applications::{
    application_router, AdmissionsService, InMemoryApplicationRepository, LocalDocumentStore,
    SqliteApplicationRepository,
};
use admissions::workflows::messages::{
    message_router, InMemoryMessageRepository, MessageService, SqliteMessageRepository,
};
use axum::{Extension, Router};
use axum_prometheus::PrometheusMetricLayer;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let app = with_probe_routes(admissions_routes(&config)?)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "admissions intake service ready");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(readiness_flag))
    .await?;

    info!("admissions intake service stopped");
    Ok(())
}

/// Wire the admissions and message services onto SQLite when a database is configured, memory
/// otherwise.
fn admissions_routes(config: &AppConfig) -> Result<Router, AppError> {
    let documents = Arc::new(LocalDocumentStore::open(&config.storage.upload_dir)?);
    let policy = config.storage.upload_policy();
    let staff = Arc::new(config.auth.staff_directory());
    if staff.is_empty() {
        warn!("no staff tokens configured; staff routes will reject every request");
    }

    let router = match &config.storage.database_path {
        Some(path) => {
            let repository = Arc::new(SqliteApplicationRepository::open(path)?);
            let service = AdmissionsService::new(repository, documents, policy);
            let messages = MessageService::new(Arc::new(SqliteMessageRepository::open(path)?));
            application_router(Arc::new(service), Arc::clone(&staff))
                .merge(message_router(Arc::new(messages), staff))
        }
        None => {
            warn!("APP_DATABASE_PATH not set; applications and messages are kept in memory");
            let repository = Arc::new(InMemoryApplicationRepository::default());
            let service = AdmissionsService::new(repository, documents, policy);
            let messages = MessageService::new(Arc::new(InMemoryMessageRepository::default()));
            application_router(Arc::new(service), Arc::clone(&staff))
                .merge(message_router(Arc::new(messages), staff))
        }
    };

    Ok(router)
}

async fn shutdown_signal(readiness: Arc<AtomicBool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    readiness.store(false, Ordering::Release);
    info!("shutdown requested; draining in-flight requests");
}
