use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use tracking_service::api;
use tracking_service::config::{Args, DatabaseSettings};
use tracking_service::db::{self, ConnectionManager};
use tracking_service::service::TrackingService;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let settings = DatabaseSettings::from(&args);

    if args.skip_migrations {
        info!("Skipping database migrations");
    } else {
        info!("Running database migrations...");
        let applied = db::run_migrations(&settings)?;
        info!("Migrations completed successfully ({} applied)", applied);
    }

    let connection = Arc::new(ConnectionManager::new(settings));
    if let Err(e) = connection.connect().await {
        error!("Failed to connect to database: {}", e);
        return Err(e.into());
    }

    let service = TrackingService::new(Arc::clone(&connection));
    let app = api::create_router(service);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.port)).await?;

    info!("Tracking service started on port {}", args.port);
    info!("Dashboard available at http://0.0.0.0:{}/dashboard", args.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    connection.disconnect().await;
    info!("Tracking service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
