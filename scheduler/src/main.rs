// Scheduler daemon entry point

use common::config::Settings;
use common::db::repositories::{
    DeliveryLedger, DeliveryRepository, MemberRepository, MemberStore, SettingsRepository,
    SettingsStore,
};
use common::db::DbPool;
use common::gateway::{MessageGateway, WhatsAppClient};
use common::scheduler::{EngineConfig, ReminderScheduler};
use common::telemetry;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load configuration before logging so the log level is honored
    let settings = Settings::load()?;
    settings.validate().map_err(|e| {
        eprintln!("Invalid configuration: {}", e);
        e
    })?;

    telemetry::init_logging(&settings.observability.log_level)?;
    info!("Starting payment reminder scheduler");

    if let Err(e) = telemetry::init_metrics(settings.observability.metrics_port) {
        // Metrics are best-effort; the scheduler still runs without them
        error!(error = %e, "Failed to start metrics exporter");
    }

    // Database pool and migrations
    info!("Initializing database connection pool");
    let db_pool = DbPool::new(&settings.database).await.map_err(|e| {
        error!(error = %e, "Failed to initialize database pool");
        e
    })?;
    db_pool.run_migrations("./migrations").await.map_err(|e| {
        error!(error = %e, "Failed to run database migrations");
        e
    })?;

    // Storage interfaces
    let settings_store =
        Arc::new(SettingsRepository::new(db_pool.clone())) as Arc<dyn SettingsStore>;
    let members = Arc::new(MemberRepository::new(db_pool.clone())) as Arc<dyn MemberStore>;
    let ledger = Arc::new(DeliveryRepository::new(db_pool)) as Arc<dyn DeliveryLedger>;

    // WhatsApp gateway client
    let gateway = Arc::new(WhatsAppClient::new(&settings.gateway)?) as Arc<dyn MessageGateway>;
    info!(base_url = %settings.gateway.base_url, "Gateway client initialized");

    // Engine
    let engine_config = EngineConfig::from_settings(&settings.scheduler)?;
    let scheduler = ReminderScheduler::new(engine_config, settings_store, members, ledger, gateway);

    // Arms the timer when the persisted settings say enabled
    scheduler.initialize().await;

    // Graceful shutdown: cancel the pending timer, let any in-flight batch
    // finish on its own task
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for Ctrl+C: {}", e))?;
    info!("Received Ctrl+C signal, shutting down");
    scheduler.stop().await;

    info!("Scheduler stopped");
    Ok(())
}
