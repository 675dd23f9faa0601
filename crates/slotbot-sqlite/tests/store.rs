use std::sync::Arc;

use chrono::{Duration, Utc};
use slotbot_core::{
    bootstrap,
    datetime,
    domain::{NewOrder, NewProvider, NewTimeSlot, Order, OrderId, Provider, TimeSlotId},
    errors::Error,
    messaging::dry_run::DryRunSms,
    scheduler::ReminderScheduler,
    store::Store,
};
use slotbot_sqlite::SqliteStore;

async fn seed(store: &dyn Store) -> Provider {
    let p = store
        .create_provider(NewProvider {
            title: "FastShip".to_string(),
            contact_number: "+6560000000".to_string(),
            reminder_time: Some("09:30".to_string()),
        })
        .await
        .unwrap();
    for (s, e) in [(15, 18), (9, 12), (12, 15)] {
        store
            .create_time_slot(NewTimeSlot {
                start_hour: s,
                end_hour: e,
                provider_id: p.id,
            })
            .await
            .unwrap();
    }
    store.provider(p.id).await.unwrap().unwrap()
}

async fn order_for(store: &dyn Store, p: &Provider, number: &str, date: &str) -> Order {
    store
        .create_order(NewOrder {
            customer_name: "Alice".to_string(),
            contact_number: number.to_string(),
            delivery_date: date.to_string(),
            provider_id: p.id,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn provider_comes_back_with_ordered_slots() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let p = seed(&store).await;

    assert_eq!(p.reminder_time.as_deref(), Some("09:30"));
    let hours: Vec<u32> = p.slots.iter().map(|s| s.start_hour).collect();
    assert_eq!(hours, vec![9, 12, 15]);

    let updated = store.set_reminder_time(p.id, None).await.unwrap();
    assert!(updated.reminder_time.is_none());
    assert_eq!(updated.slots.len(), 3);

    assert!(matches!(
        store.set_reminder_time(p.id, Some("25".to_string())).await,
        Err(Error::InvalidFormat(_))
    ));
}

#[tokio::test]
async fn rejects_invalid_rows() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let p = seed(&store).await;

    let err = store
        .create_time_slot(NewTimeSlot {
            start_hour: 18,
            end_hour: 9,
            provider_id: p.id,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Invalid(_)));

    let err = store
        .create_order(NewOrder {
            customer_name: "Bob".to_string(),
            contact_number: "+1".to_string(),
            delivery_date: "2024-00-10".to_string(),
            provider_id: p.id,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidMonth(0)));

    store.delete_provider(p.id).await.unwrap();
    let err = store
        .create_order(NewOrder {
            customer_name: "Bob".to_string(),
            contact_number: "+1".to_string(),
            delivery_date: "2024-06-10".to_string(),
            provider_id: p.id,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Invalid(_)));
}

#[tokio::test]
async fn soft_deletes_hide_rows() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let p = seed(&store).await;
    let first = order_for(&store, &p, "+1", "2024-06-10").await;
    let second = order_for(&store, &p, "+1", "2024-06-11").await;

    assert_eq!(
        store.latest_order_for_contact("+1").await.unwrap().unwrap().id,
        second.id
    );
    store.delete_order(second.id).await.unwrap();
    assert!(store.order(second.id).await.unwrap().is_none());
    assert_eq!(
        store.latest_order_for_contact("+1").await.unwrap().unwrap().id,
        first.id
    );
    assert!(matches!(
        store.delete_order(second.id).await,
        Err(Error::NotFound(_))
    ));

    store.delete_time_slot(p.slots[0].id).await.unwrap();
    assert_eq!(store.time_slots(p.id).await.unwrap().len(), 2);

    store.delete_provider(p.id).await.unwrap();
    assert!(store.provider(p.id).await.unwrap().is_none());
    assert!(store.active_orders().await.unwrap().is_empty());
    assert!(store.orders_for_provider(p.id).await.unwrap().is_empty());
    assert!(store.latest_order_for_contact("+1").await.unwrap().is_none());
}

#[tokio::test]
async fn record_selection_replaces_choices() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let p = seed(&store).await;
    let o = order_for(&store, &p, "+1", "2024-06-10").await;

    store.record_selection(o.id, &[p.slots[0].id]).await.unwrap();
    let updated = store
        .record_selection(o.id, &[p.slots[1].id, p.slots[2].id])
        .await
        .unwrap();
    assert_eq!(updated.retries_count, 2);

    let chosen: Vec<TimeSlotId> = store
        .choices(o.id)
        .await
        .unwrap()
        .iter()
        .map(|c| c.time_slot_id)
        .collect();
    assert_eq!(chosen, vec![p.slots[1].id, p.slots[2].id]);
}

#[tokio::test]
async fn manual_choices_skip_the_retry_counter() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let p = seed(&store).await;
    let o = order_for(&store, &p, "+1", "2024-06-10").await;

    store.add_choice(o.id, p.slots[2].id).await.unwrap();
    store.add_choice(o.id, p.slots[2].id).await.unwrap();
    assert_eq!(store.choices(o.id).await.unwrap().len(), 1);
    assert_eq!(store.order(o.id).await.unwrap().unwrap().retries_count, 0);

    assert!(matches!(
        store.add_choice(OrderId(9_999), p.slots[0].id).await,
        Err(Error::Invalid(_))
    ));
    store.delete_time_slot(p.slots[0].id).await.unwrap();
    assert!(matches!(
        store.add_choice(o.id, p.slots[0].id).await,
        Err(Error::Invalid(_))
    ));

    store.delete_choice(o.id, p.slots[2].id).await.unwrap();
    assert!(store.choices(o.id).await.unwrap().is_empty());
    assert!(matches!(
        store.delete_choice(o.id, p.slots[2].id).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn providers_skips_deleted_rows() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let p = seed(&store).await;
    let q = seed(&store).await;
    store.delete_provider(p.id).await.unwrap();

    let all = store.providers().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, q.id);
    assert_eq!(all[0].slots.len(), 3);
}

#[tokio::test]
async fn failed_selection_leaves_order_untouched() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let p = seed(&store).await;
    let o = order_for(&store, &p, "+1", "2024-06-10").await;
    store.record_selection(o.id, &[p.slots[0].id]).await.unwrap();

    let err = store
        .record_selection(o.id, &[p.slots[1].id, TimeSlotId(9_999)])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Invalid(_)));

    assert_eq!(store.order(o.id).await.unwrap().unwrap().retries_count, 1);
    let chosen: Vec<TimeSlotId> = store
        .choices(o.id)
        .await
        .unwrap()
        .iter()
        .map(|c| c.time_slot_id)
        .collect();
    assert_eq!(chosen, vec![p.slots[0].id]);
}

#[tokio::test]
async fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("slotbot.db");

    let (provider_id, order_id) = {
        let store = SqliteStore::open(&path).await.unwrap();
        let p = seed(&store).await;
        let o = order_for(&store, &p, "+1", "2024-06-10").await;
        store.record_selection(o.id, &[p.slots[2].id]).await.unwrap();
        (p.id, o.id)
    };

    let store = SqliteStore::open(&path).await.unwrap();
    assert_eq!(store.provider(provider_id).await.unwrap().unwrap().slots.len(), 3);
    assert_eq!(store.order(order_id).await.unwrap().unwrap().retries_count, 1);
    assert_eq!(store.choices(order_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn bootstrap_aborts_on_corrupt_stored_date() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("slotbot.db");

    let store = SqliteStore::open(&path).await.unwrap();
    let p = seed(&store).await;
    let upcoming = datetime::format_date(Utc::now() + Duration::days(7));
    order_for(&store, &p, "+1", &upcoming).await;
    let bad = order_for(&store, &p, "+2", &upcoming).await;

    // Written behind the store's back; the store itself never accepts this date.
    let raw = rusqlite::Connection::open(&path).unwrap();
    raw.execute(
        "UPDATE orders SET delivery_date = '2024-13-01' WHERE id = ?1",
        [bad.id.0],
    )
    .unwrap();
    drop(raw);

    let store: Arc<dyn Store> = Arc::new(store);
    let scheduler = ReminderScheduler::new(Arc::new(DryRunSms::new()));
    let err = bootstrap::schedule_all(&store, &scheduler).await.unwrap_err();

    assert!(matches!(err, Error::InvalidMonth(13)));
    assert!(scheduler.pending().await.is_empty());
}

#[tokio::test]
async fn bootstrap_schedules_stored_orders() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let p = seed(&store).await;
    order_for(&store, &p, "+1", &datetime::format_date(Utc::now() + Duration::days(3))).await;
    order_for(&store, &p, "+2", "2020-01-01").await;

    let store: Arc<dyn Store> = Arc::new(store);
    let scheduler = ReminderScheduler::new(Arc::new(DryRunSms::new()));
    let summary = bootstrap::schedule_all(&store, &scheduler).await.unwrap();

    assert_eq!(summary.loaded, 2);
    assert_eq!(summary.scheduled, 1);
    assert_eq!(summary.skipped, 1);
    scheduler.shutdown().await;
}
