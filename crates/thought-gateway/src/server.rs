use std::sync::Arc;

use axum::Router;
use thought_common::{Error, Result};
use thought_config::AppConfig;
use thought_db::{MigrationReport, MigrationRunner, StorageGateway};
use tokio::net::TcpListener;
use tracing::info;

use crate::router::build_router;
use crate::state::AppState;

/// Binds the HTTP surface once the database schema is current.
pub struct GatewayServer {
    config: AppConfig,
    gateway: StorageGateway,
}

impl GatewayServer {
    pub fn new(config: AppConfig, gateway: StorageGateway) -> Self {
        Self { config, gateway }
    }

    /// Apply pending migrations and build the router. Nothing is listening
    /// yet, so a migration failure here means no request is ever served.
    pub async fn prepare(self) -> Result<(AppConfig, Router)> {
        let runner = MigrationRunner::new(
            self.gateway.clone(),
            self.config.resolved_migrations_dir(),
        );
        let report: MigrationReport = tokio::task::spawn_blocking(move || runner.migrate())
            .await
            .map_err(|e| Error::Gateway(format!("migration task failed: {e}")))??;
        if !report.is_noop() {
            info!("applied {} migration(s)", report.applied.len());
        }

        let state = Arc::new(AppState::new(self.config.clone(), self.gateway));
        Ok((self.config, build_router(state)))
    }

    pub async fn run(self) -> Result<()> {
        let (config, app) = self.prepare().await?;
        let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

        let listener = TcpListener::bind(&addr).await?;
        info!("thought system listening on {}", addr);
        info!("health check: http://{}/health", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Gateway(format!("server error: {e}")))?;

        Ok(())
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    } else {
        // No signal handler available; run until the process is killed.
        std::future::pending::<()>().await;
    }
}
