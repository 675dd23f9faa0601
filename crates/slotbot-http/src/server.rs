//! Router construction and the listening loop.

use std::{future::Future, sync::Arc};

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use slotbot_core::{
    config::Config, messaging::port::SmsPort, reply::ReplyInterpreter,
    scheduler::ReminderScheduler, store::Store, Result,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::handlers;

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub scheduler: ReminderScheduler,
    pub interpreter: Arc<ReplyInterpreter>,
    pub sms: Arc<dyn SmsPort>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        scheduler: ReminderScheduler,
        sms: Arc<dyn SmsPort>,
        config: Arc<Config>,
    ) -> Self {
        let interpreter = Arc::new(ReplyInterpreter::new(store.clone(), sms.clone()));
        Self {
            store,
            scheduler,
            interpreter,
            sms,
            config,
        }
    }
}

pub fn app(state: AppState) -> Router {
    let mut api = Router::new()
        .route(
            "/api/provider",
            get(handlers::list_providers).post(handlers::create_provider),
        )
        .route(
            "/api/provider/{id}",
            get(handlers::get_provider).delete(handlers::delete_provider),
        )
        .route("/api/provider/{id}/set_reminder", put(handlers::set_reminder))
        .route("/api/time_slot", post(handlers::create_time_slot))
        // GET reads the segment as a provider id; axum allows one name per segment.
        .route(
            "/api/time_slot/{id}",
            get(handlers::list_time_slots).delete(handlers::delete_time_slot),
        )
        .route("/api/order", post(handlers::create_order))
        // Same here: GET lists a provider's orders.
        .route(
            "/api/order/{id}",
            get(handlers::list_orders).delete(handlers::delete_order),
        )
        .route("/api/choice", post(handlers::create_choice))
        .route("/api/choice/{order_id}", get(handlers::get_choices))
        .route(
            "/api/choice/{order_id}/{time_slot_id}",
            delete(handlers::delete_choice),
        )
        .route("/api/sms", post(handlers::send_sms))
        .route("/api/sms/reply", post(handlers::sms_reply))
        .route("/health", get(handlers::health));

    if state.config.trial_endpoints {
        api = api
            .route("/api/cron/test", get(handlers::cron_test))
            .route("/api/cron/trigger/{order_id}", get(handlers::cron_trigger));
    }

    api.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve<F>(state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = state.config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {addr}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

