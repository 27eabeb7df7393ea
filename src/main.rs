//! Cooperative credit lending server
//!
//! Wires configuration, the database pool, the domain services, background
//! jobs and the HTTP router, then serves until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::{routing::get, Router};
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};

use coopcredit::application::ApplicationService;
use coopcredit::committee::CommitteeService;
use coopcredit::config::Config;
use coopcredit::consent::ConsentService;
use coopcredit::delinquency::DelinquencyMonitor;
use coopcredit::events::Notifier;
use coopcredit::member::MemberDirectory;
use coopcredit::register_service::RegistrarService;
use coopcredit::schedule::ScheduleService;
use coopcredit::state::AppState;
use coopcredit::threshold::ThresholdAllocator;
use coopcredit::{db, handlers, jobs, middleware, routes};

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .init();

    tracing::info!(
        environment = config.environment.as_str(),
        "Starting coopcredit server"
    );

    let db_pool = match db::create_pool(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "Database connection failed");
            std::process::exit(1);
        }
    };

    if let Err(e) = db::run_migrations(&db_pool).await {
        tracing::error!(error = %e, "Migrations failed");
        std::process::exit(1);
    }

    let notifier = Notifier::new(config.notification_webhook_url.clone());
    let members = MemberDirectory::new(db_pool.clone());
    let applications = ApplicationService::new(db_pool.clone());
    let consents = ConsentService::new(db_pool.clone(), config.consent_validity_days);
    let committee = CommitteeService::new(
        db_pool.clone(),
        applications.clone(),
        config.committee_quorum,
    );
    let allocator = ThresholdAllocator::new(
        db_pool.clone(),
        config.monthly_ceiling,
        config.allocation_max_retries,
    );
    let schedules = ScheduleService::new(db_pool.clone(), config.reconciliation_tolerance);
    let registrar = RegistrarService::new(
        db_pool.clone(),
        applications.clone(),
        consents.clone(),
        allocator.clone(),
        schedules.clone(),
        config.clone(),
    );
    let delinquency = DelinquencyMonitor::new(db_pool.clone(), config.grace_days);

    let rollover = jobs::RolloverJob::new(
        db_pool.clone(),
        allocator.clone(),
        registrar.clone(),
        notifier.clone(),
        config.monthly_ceiling,
        config.carry_forward_fraction,
    );
    let mut scheduler = match jobs::start(rollover, delinquency.clone(), notifier.clone()).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start background jobs");
            std::process::exit(1);
        }
    };

    let app_state = AppState {
        db_pool: db_pool.clone(),
        config: Arc::new(config.clone()),
        members: Arc::new(members),
        applications: Arc::new(applications),
        consents: Arc::new(consents),
        committee: Arc::new(committee),
        allocator: Arc::new(allocator),
        registrar: Arc::new(registrar),
        schedules: Arc::new(schedules),
        delinquency: Arc::new(delinquency),
        notifier,
    };

    let app = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .merge(routes::eligibility_routes())
        .merge(routes::application_routes())
        .merge(routes::consent_routes())
        .merge(routes::committee_routes())
        .merge(routes::threshold_routes())
        .merge(routes::register_routes())
        .merge(routes::schedule_routes())
        .merge(routes::delinquency_routes())
        .with_state(app_state)
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_tracing))
        .layer(configure_cors(&config));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, "Failed to bind {}", addr);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
    }

    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!(error = %e, "Job scheduler shutdown failed");
    }
    tracing::info!("Server shutdown complete");
}

fn configure_cors(config: &Config) -> CorsLayer {
    let Some(allowed) = config.cors_allowed_origins.as_deref() else {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    };

    let origins: Vec<HeaderValue> = allowed
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
