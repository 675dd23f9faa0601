//! Startup pass that re-creates reminders for every active order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::{
    domain::{Order, Provider},
    scheduler::{plan_at, ReminderPlan, ReminderScheduler, Scheduled},
    store::Store,
    Result,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BootstrapSummary {
    /// Active orders read from storage.
    pub loaded: usize,
    /// Reminders registered.
    pub scheduled: usize,
    /// Orders with no reminder time, a past fire time or a missing provider.
    pub skipped: usize,
}

/// Load every active order with its provider and schedule its reminder.
///
/// All fire times are computed before anything is registered: a malformed stored
/// date or reminder time aborts the whole pass with that error, since it means the
/// stored data must be fixed before serving. Registration then spawns one
/// independent task per order and returns without waiting for any of them.
pub async fn schedule_all(
    store: &Arc<dyn Store>,
    scheduler: &ReminderScheduler,
) -> Result<BootstrapSummary> {
    let now = Utc::now();
    let orders = store.active_orders().await?;
    let mut summary = BootstrapSummary {
        loaded: orders.len(),
        ..Default::default()
    };

    let mut due: Vec<(Order, Provider, DateTime<Utc>)> = Vec::new();
    for order in orders {
        let Some(provider) = store.provider(order.provider_id).await? else {
            warn!(order_id = %order.id, provider_id = %order.provider_id, "order has no live provider");
            summary.skipped += 1;
            continue;
        };

        match plan_at(&order, &provider, now)? {
            ReminderPlan::At { fire_at } => due.push((order, provider, fire_at)),
            ReminderPlan::NoReminderTime | ReminderPlan::InPast { .. } => summary.skipped += 1,
        }
    }

    for (order, provider, fire_at) in due {
        match scheduler.schedule_at(&order, &provider, fire_at).await {
            Scheduled::Registered { .. } => summary.scheduled += 1,
            Scheduled::Skipped(_) => summary.skipped += 1,
        }
    }

    info!(
        loaded = summary.loaded,
        scheduled = summary.scheduled,
        skipped = summary.skipped,
        "reminders bootstrapped"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        datetime,
        domain::{NewOrder, NewProvider, NewTimeSlot},
        messaging::dry_run::DryRunSms,
        store::MemoryStore,
    };

    async fn store_with_provider(reminder_time: Option<&str>) -> (Arc<dyn Store>, Provider) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let p = store
            .create_provider(NewProvider {
                title: "FastShip".to_string(),
                contact_number: "+100".to_string(),
                reminder_time: reminder_time.map(str::to_string),
            })
            .await
            .unwrap();
        store
            .create_time_slot(NewTimeSlot {
                start_hour: 9,
                end_hour: 12,
                provider_id: p.id,
            })
            .await
            .unwrap();
        (store, p)
    }

    async fn add_order(store: &Arc<dyn Store>, p: &Provider, days_ahead: i64) -> Order {
        store
            .create_order(NewOrder {
                customer_name: "Alice".to_string(),
                contact_number: format!("+9{days_ahead}"),
                delivery_date: datetime::format_date(Utc::now() + chrono::Duration::days(days_ahead)),
                provider_id: p.id,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn schedules_future_orders_and_skips_the_rest() {
        let (store, p) = store_with_provider(Some("9")).await;
        add_order(&store, &p, 5).await;
        add_order(&store, &p, 10).await;
        add_order(&store, &p, -3).await;

        let scheduler = ReminderScheduler::new(Arc::new(DryRunSms::new()));
        let summary = schedule_all(&store, &scheduler).await.unwrap();

        assert_eq!(
            summary,
            BootstrapSummary {
                loaded: 3,
                scheduled: 2,
                skipped: 1
            }
        );
        assert_eq!(scheduler.pending().await.len(), 2);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn provider_without_reminder_time_schedules_nothing() {
        let (store, p) = store_with_provider(None).await;
        add_order(&store, &p, 5).await;

        let scheduler = ReminderScheduler::new(Arc::new(DryRunSms::new()));
        let summary = schedule_all(&store, &scheduler).await.unwrap();
        assert_eq!(summary.scheduled, 0);
        assert_eq!(summary.skipped, 1);
        assert!(scheduler.pending().await.is_empty());
    }
}
