use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde::Serialize;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info, warn};

use netpass_backend::api;
use netpass_backend::config::AppConfig;
use netpass_backend::logging::init_tracing;
use netpass_backend::middleware::logging::{request_logging_middleware, UuidRequestId};
use netpass_backend::payments::daraja::DarajaClient;
use netpass_backend::payments::gateway::PaymentGateway;
use netpass_backend::services::voucher_lifecycle::VoucherLifecycle;
use netpass_backend::store;
use netpass_backend::store::memory::MemoryVoucherStore;
use netpass_backend::store::repository::VoucherStore;
use netpass_backend::store::voucher_repository::PgVoucherStore;

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    config.validate()?;
    init_tracing(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        "Starting netpass backend service"
    );

    // Voucher store: Postgres when configured, in-memory otherwise
    let db_pool = match &config.database.url {
        Some(_) => {
            info!("Initializing database connection pool...");
            let pool = store::init_pool_from_config(&config.database)
                .await
                .map_err(|e| {
                    error!("Failed to initialize database pool: {}", e);
                    anyhow::anyhow!(e)
                })?;
            Some(pool)
        }
        None => {
            warn!("DATABASE_URL not set, falling back to the in-memory voucher store");
            None
        }
    };

    let voucher_store: Arc<dyn VoucherStore> = match db_pool.clone() {
        Some(pool) => Arc::new(PgVoucherStore::new(pool)),
        None => Arc::new(MemoryVoucherStore::new()),
    };

    let gateway: Arc<dyn PaymentGateway> =
        Arc::new(DarajaClient::new(config.mpesa.clone()).map_err(|e| {
            error!("Failed to initialize payment gateway client: {}", e);
            anyhow::anyhow!(e)
        })?);

    let lifecycle = Arc::new(VoucherLifecycle::new(
        voucher_store,
        gateway,
        config.vouchers.clone(),
    ));

    info!(
        redemption_mode = ?config.vouchers.redemption_mode,
        "Voucher lifecycle service initialized"
    );

    let api_state = api::ApiState { lifecycle };

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .with_state(AppState {
            db_pool: db_pool.clone(),
        })
        .merge(api::router(api_state))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "Server listening, ready to accept connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");

    Ok(())
}

// Application state for the health endpoints
#[derive(Clone)]
struct AppState {
    db_pool: Option<sqlx::PgPool>,
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: &'static str,
    store: &'static str,
}

async fn root() -> &'static str {
    "netpass voucher gateway"
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<HealthStatus>, (axum::http::StatusCode, String)> {
    match &state.db_pool {
        Some(pool) => match store::health_check(pool).await {
            Ok(()) => Ok(Json(HealthStatus {
                status: "ok",
                store: "postgres",
            })),
            Err(e) => {
                error!(error = %e, "Health check failed");
                Err((
                    axum::http::StatusCode::SERVICE_UNAVAILABLE,
                    "Service Unavailable".to_string(),
                ))
            }
        },
        None => Ok(Json(HealthStatus {
            status: "ok",
            store: "memory",
        })),
    }
}
