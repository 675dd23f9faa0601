use std::sync::Arc;

use anyhow::Context;
use slotbot_core::{
    bootstrap,
    config::Config,
    messaging::{dry_run::DryRunSms, port::SmsPort, throttled::ThrottledSms},
    scheduler::ReminderScheduler,
    store::{MemoryStore, Store},
};
use slotbot_http::AppState;
use slotbot_sqlite::SqliteStore;
use slotbot_twilio::TwilioSms;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    slotbot_core::logging::init("slotbot")?;

    let cfg = Arc::new(Config::load()?);

    let store: Arc<dyn Store> = match &cfg.database_path {
        Some(path) => Arc::new(
            SqliteStore::open(path)
                .await
                .with_context(|| format!("opening database {}", path.display()))?,
        ),
        None => {
            warn!("DATABASE_PATH not set; data is kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let transport: Arc<dyn SmsPort> = match TwilioSms::from_config(&cfg)? {
        Some(twilio) => Arc::new(twilio),
        None => {
            info!("sms transport: dry-run");
            Arc::new(DryRunSms::new())
        }
    };
    let sms: Arc<dyn SmsPort> = Arc::new(ThrottledSms::new(transport, cfg.throttle()));

    let scheduler = ReminderScheduler::new(sms.clone());
    bootstrap::schedule_all(&store, &scheduler)
        .await
        .context("stored orders could not be scheduled")?;

    let state = AppState::new(store, scheduler.clone(), sms, cfg);
    let served = slotbot_http::serve(state, shutdown_signal()).await;

    scheduler.shutdown().await;
    served.context("http server failed")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("ctrl-c handler unavailable: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
