use org_auth_service::{
    build_router,
    config::AuthConfig,
    db,
    services::{
        BroadcastEventPublisher, Database, EmailNotifier, MockEmailService, SmtpEmailService,
    },
    utils::Argon2Hasher,
    AppState, Ports,
};
use service_core::error::AppError;
use service_core::observability::logging::init_tracing;
use std::sync::Arc;
use tokio::signal;

const EVENT_BUS_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = AuthConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting organization auth service"
    );

    tracing::info!("Connecting to Postgres");
    let pool = db::create_pool(&config.database)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
    tracing::info!("Database initialized successfully");

    let database = Arc::new(Database::new(pool));

    let email: Arc<dyn EmailNotifier> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpEmailService::new(smtp)?),
        None => {
            tracing::warn!("SMTP not configured; verification emails are only logged");
            Arc::new(MockEmailService::new())
        }
    };

    let events = Arc::new(BroadcastEventPublisher::new(EVENT_BUS_CAPACITY));
    spawn_event_logger(&events);

    let state = AppState::new(
        config.clone(),
        Ports {
            accounts: database.clone(),
            memberships: database,
            hasher: Arc::new(Argon2Hasher::new()),
            email,
            events,
        },
    );
    tracing::info!("Services initialized");

    let app = build_router(state).await?;

    let addr = config.common.listen_addr();

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

/// Downstream consumers subscribe to the same bus; this one only logs.
fn spawn_event_logger(events: &BroadcastEventPublisher) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => tracing::info!(event = event.name(), "Domain event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger lagged behind");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
