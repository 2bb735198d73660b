use provisioning_service::{
    build_router,
    config::ProvisioningConfig,
    services::{AesGcmVault, PgProvisioningRepository, UserProvisioner},
    AppState,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::observability::logging::init_tracing;
use std::sync::Arc;
use tokio::signal;

use provisioning_service::services::odoo::OdooHttpClient;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = ProvisioningConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting provisioning service"
    );

    let repository = PgProvisioningRepository::connect(
        config.database.url.expose_secret(),
        config.database.max_connections,
    )
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
    repository
        .run_migrations()
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
    tracing::info!("Database initialized successfully");

    let vault = AesGcmVault::from_base64(&config.vault.master_key)
        .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;
    let odoo = OdooHttpClient::new(&config.odoo)?;
    let policy = config.load_group_policy()?;
    tracing::info!(policy_version = %policy.version, "Group policy loaded");

    let provisioner = UserProvisioner::new(
        Arc::new(odoo),
        Arc::new(repository),
        Arc::new(vault),
        policy,
        &config.odoo,
    );

    let state = AppState {
        service_name: config.service_name.clone(),
        provisioner: Arc::new(provisioner),
    };
    let app = build_router(state);

    let addr = format!("{}:{}", config.common.host, config.common.port);
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
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
