//! Request handlers for the management API, the SMS webhook and trial triggers.

use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Form, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slotbot_core::{
    datetime,
    domain::{
        Choice, NewOrder, NewProvider, NewTimeSlot, Order, OrderId, Provider, ProviderId,
        ReplyState, TimeSlot, TimeSlotId,
    },
    errors::Error,
    messaging::types::{InboundSms, SendReceipt},
    reply::ReplyOutcome,
    scheduler::Scheduled,
    Result,
};
use tracing::{info, warn};

use crate::{error::ApiError, server::AppState};

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct SetReminderRequest {
    #[serde(default)]
    pub reminder_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendSmsRequest {
    pub to: String,
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct TrialQuery {
    pub provider_id: i64,
    pub contact_number: String,
    #[serde(default)]
    pub customer_name: String,
}

/// Whether a reminder was registered, and for when.
#[derive(Debug, Serialize)]
pub struct ReminderStatus {
    pub scheduled: bool,
    pub fire_at: Option<String>,
}

impl From<&Scheduled> for ReminderStatus {
    fn from(s: &Scheduled) -> Self {
        match s {
            Scheduled::Registered { fire_at } => Self {
                scheduled: true,
                fire_at: Some(fire_at.to_rfc3339()),
            },
            Scheduled::Skipped(_) => Self {
                scheduled: false,
                fire_at: None,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderCreated {
    #[serde(flatten)]
    pub order: Order,
    pub reminder: ReminderStatus,
}

#[derive(Debug, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub choices: Vec<TimeSlotId>,
    pub state: ReplyState,
}

#[derive(Debug, Serialize)]
pub struct ProviderView {
    #[serde(flatten)]
    pub provider: Provider,
    pub orders: Vec<Order>,
}

#[derive(Debug, Serialize)]
pub struct TrialResponse {
    pub order_id: OrderId,
    pub reminder: ReminderStatus,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub pending_reminders: usize,
}

// --- providers ---

pub async fn create_provider(
    State(state): State<AppState>,
    Json(body): Json<NewProvider>,
) -> ApiResult<(StatusCode, Json<Provider>)> {
    let provider = state.store.create_provider(body).await?;
    info!(provider_id = %provider.id, "provider created");
    Ok((StatusCode::CREATED, Json(provider)))
}

/// GET /api/provider: every live provider with its slots and orders.
pub async fn list_providers(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ProviderView>>> {
    let providers = state.store.providers().await?;
    let mut out = Vec::with_capacity(providers.len());
    for provider in providers {
        let orders = state.store.orders_for_provider(provider.id).await?;
        out.push(ProviderView { provider, orders });
    }
    Ok(Json(out))
}

/// PUT /api/provider/{id}/set_reminder
///
/// Pending reminders of the provider's orders are re-registered at the new time
/// (or dropped when the time is cleared).
pub async fn set_reminder(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<SetReminderRequest>,
) -> ApiResult<Json<Provider>> {
    let id = ProviderId(id);
    let provider = state.store.set_reminder_time(id, body.reminder_time).await?;

    state.scheduler.cancel_provider(id).await;
    for order in state.store.orders_for_provider(id).await? {
        if let Err(e) = state.scheduler.schedule(&order, &provider).await {
            warn!(order_id = %order.id, "could not reschedule reminder: {e}");
        }
    }
    Ok(Json(provider))
}

pub async fn get_provider(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Provider>> {
    let id = ProviderId(id);
    let provider = state
        .store
        .provider(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("provider {id}")))?;
    Ok(Json(provider))
}

pub async fn delete_provider(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let id = ProviderId(id);
    state.store.delete_provider(id).await?;
    let cancelled = state.scheduler.cancel_provider(id).await;
    info!(provider_id = %id, cancelled, "provider deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- time slots ---

pub async fn create_time_slot(
    State(state): State<AppState>,
    Json(body): Json<NewTimeSlot>,
) -> ApiResult<(StatusCode, Json<TimeSlot>)> {
    let slot = state.store.create_time_slot(body).await?;
    Ok((StatusCode::CREATED, Json(slot)))
}

pub async fn list_time_slots(
    State(state): State<AppState>,
    Path(provider_id): Path<i64>,
) -> ApiResult<Json<Vec<TimeSlot>>> {
    Ok(Json(state.store.time_slots(ProviderId(provider_id)).await?))
}

pub async fn delete_time_slot(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.store.delete_time_slot(TimeSlotId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- orders ---

/// POST /api/order
///
/// Persists the order and schedules its reminder in the same request.
pub async fn create_order(
    State(state): State<AppState>,
    Json(body): Json<NewOrder>,
) -> ApiResult<(StatusCode, Json<OrderCreated>)> {
    let order = state.store.create_order(body).await?;
    let provider = state
        .store
        .provider(order.provider_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("provider {}", order.provider_id)))?;

    let scheduled = state.scheduler.schedule(&order, &provider).await?;
    info!(order_id = %order.id, ?scheduled, "order created");

    Ok((
        StatusCode::CREATED,
        Json(OrderCreated {
            reminder: ReminderStatus::from(&scheduled),
            order,
        }),
    ))
}

pub async fn list_orders(
    State(state): State<AppState>,
    Path(provider_id): Path<i64>,
) -> ApiResult<Json<Vec<OrderView>>> {
    let orders = state
        .store
        .orders_for_provider(ProviderId(provider_id))
        .await?;
    let mut out = Vec::with_capacity(orders.len());
    for order in orders {
        let choices: Vec<TimeSlotId> = state
            .store
            .choices(order.id)
            .await?
            .into_iter()
            .map(|c| c.time_slot_id)
            .collect();
        let reply_state = ReplyState::derive(order.retries_count, !choices.is_empty());
        out.push(OrderView {
            order,
            choices,
            state: reply_state,
        });
    }
    Ok(Json(out))
}

pub async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let id = OrderId(id);
    state.store.delete_order(id).await?;
    state.scheduler.cancel(id).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_choices(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> ApiResult<Json<Vec<Choice>>> {
    let order_id = OrderId(order_id);
    if state.store.order(order_id).await?.is_none() {
        return Err(Error::NotFound(format!("order {order_id}")).into());
    }
    Ok(Json(state.store.choices(order_id).await?))
}

/// POST /api/choice: attach one slot to an order by hand.
pub async fn create_choice(
    State(state): State<AppState>,
    Json(body): Json<Choice>,
) -> ApiResult<(StatusCode, Json<Choice>)> {
    let choice = state
        .store
        .add_choice(body.order_id, body.time_slot_id)
        .await?;
    Ok((StatusCode::CREATED, Json(choice)))
}

pub async fn delete_choice(
    State(state): State<AppState>,
    Path((order_id, time_slot_id)): Path<(i64, i64)>,
) -> ApiResult<StatusCode> {
    state
        .store
        .delete_choice(OrderId(order_id), TimeSlotId(time_slot_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- sms ---

/// POST /api/sms/reply (carrier webhook, form encoded).
pub async fn sms_reply(
    State(state): State<AppState>,
    Form(sms): Form<InboundSms>,
) -> ApiResult<Json<ReplyOutcome>> {
    let outcome = state.interpreter.respond(&sms.from, &sms.body).await?;
    Ok(Json(outcome))
}

/// POST /api/sms: send an arbitrary message. Transport errors surface as 502.
pub async fn send_sms(
    State(state): State<AppState>,
    Json(body): Json<SendSmsRequest>,
) -> ApiResult<Json<SendReceipt>> {
    if body.to.trim().is_empty() {
        return Err(Error::Invalid("recipient is required".to_string()).into());
    }
    if body.body.trim().is_empty() {
        return Err(Error::EmptyMessage.into());
    }
    Ok(Json(state.sms.send(body.to.trim(), &body.body).await?))
}

// --- trial triggers ---

/// Fire time for a trial reminder: the current minute plus `delay`.
///
/// `Config` keeps `delay` at 60s or more, so the result is always in the future.
pub fn trial_fire_at(now: DateTime<Utc>, delay: Duration) -> Result<DateTime<Utc>> {
    let base = datetime::resolve(&datetime::format_date(now), &datetime::format_time(now))?;
    let delay = chrono::Duration::from_std(delay)
        .map_err(|e| Error::Invalid(format!("trial delay out of range: {e}")))?;
    Ok(base + delay)
}

/// GET /api/cron/test
///
/// Sends a reminder for an unsaved order (id 0) delivering tomorrow.
pub async fn cron_test(
    State(state): State<AppState>,
    Query(q): Query<TrialQuery>,
) -> ApiResult<Json<TrialResponse>> {
    let provider_id = ProviderId(q.provider_id);
    let provider = state
        .store
        .provider(provider_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("provider {provider_id}")))?;
    if q.contact_number.trim().is_empty() {
        return Err(Error::Invalid("contact_number is required".to_string()).into());
    }

    let now = Utc::now();
    let order = Order {
        id: OrderId(0),
        customer_name: q.customer_name,
        contact_number: q.contact_number.trim().to_string(),
        delivery_date: datetime::format_date(now + chrono::Duration::days(1)),
        provider_id,
        retries_count: 0,
    };
    let fire_at = trial_fire_at(now, state.config.trial_delay)?;
    let scheduled = state.scheduler.schedule_trial(&order, &provider, fire_at).await;

    Ok(Json(TrialResponse {
        order_id: order.id,
        reminder: ReminderStatus::from(&scheduled),
    }))
}

/// GET /api/cron/trigger/{order_id}: send a stored order's reminder shortly.
///
/// The order's own day-before reminder stays registered.
pub async fn cron_trigger(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> ApiResult<Json<TrialResponse>> {
    let order_id = OrderId(order_id);
    let order = state
        .store
        .order(order_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("order {order_id}")))?;
    let provider = state
        .store
        .provider(order.provider_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("provider {}", order.provider_id)))?;

    let fire_at = trial_fire_at(Utc::now(), state.config.trial_delay)?;
    let scheduled = state.scheduler.schedule_trial(&order, &provider, fire_at).await;

    Ok(Json(TrialResponse {
        order_id,
        reminder: ReminderStatus::from(&scheduled),
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        pending_reminders: state.scheduler.pending().await.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn trial_fire_time_truncates_to_the_minute() {
        let now = Utc.with_ymd_and_hms(2024, 6, 9, 14, 5, 42).unwrap();
        let at = trial_fire_at(now, Duration::from_secs(60)).unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2024, 6, 9, 14, 6, 0).unwrap());
    }

    #[test]
    fn minimum_trial_delay_lands_in_the_future() {
        let min = Duration::from_secs(slotbot_core::config::MIN_TRIAL_DELAY_SECS);
        let now = Utc.with_ymd_and_hms(2024, 6, 9, 14, 5, 59).unwrap()
            + chrono::Duration::milliseconds(999);
        assert!(trial_fire_at(now, min).unwrap() > now);
    }
}
