use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    datetime,
    domain::{
        Choice, NewOrder, NewProvider, NewTimeSlot, Order, OrderId, Provider, ProviderId,
        TimeSlot, TimeSlotId,
    },
    store::{validate_reminder_time, validate_time_slot, Store},
    Error, Result,
};

struct Row<T> {
    value: T,
    deleted: bool,
}

impl<T> Row<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            deleted: false,
        }
    }
}

#[derive(Default)]
struct Tables {
    providers: Vec<Row<Provider>>,
    slots: Vec<Row<TimeSlot>>,
    orders: Vec<Row<Order>>,
    choices: Vec<Row<Choice>>,
    next_id: i64,
}

impl Tables {
    fn alloc_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn provider_live(&self, id: ProviderId) -> bool {
        self.providers
            .iter()
            .any(|r| !r.deleted && r.value.id == id)
    }

    fn slots_of(&self, provider: ProviderId) -> Vec<TimeSlot> {
        let mut out: Vec<TimeSlot> = self
            .slots
            .iter()
            .filter(|r| !r.deleted && r.value.provider_id == provider)
            .map(|r| r.value)
            .collect();
        out.sort_by_key(|s| (s.start_hour, s.id));
        out
    }

    fn provider_with_slots(&self, id: ProviderId) -> Option<Provider> {
        let row = self
            .providers
            .iter()
            .find(|r| !r.deleted && r.value.id == id)?;
        let mut p = row.value.clone();
        p.slots = self.slots_of(id);
        Some(p)
    }

    fn live_orders(&self) -> impl Iterator<Item = &Order> + '_ {
        self.orders
            .iter()
            .filter(move |r| !r.deleted && self.provider_live(r.value.provider_id))
            .map(|r| &r.value)
    }
}

/// In-process store guarded by a single async mutex.
///
/// Used when no database is configured and by tests. Data is lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_provider(&self, new: NewProvider) -> Result<Provider> {
        validate_reminder_time(new.reminder_time.as_deref())?;
        let mut t = self.tables.lock().await;
        let provider = Provider {
            id: ProviderId(t.alloc_id()),
            title: new.title,
            contact_number: new.contact_number,
            reminder_time: new.reminder_time,
            slots: Vec::new(),
        };
        t.providers.push(Row::new(provider.clone()));
        Ok(provider)
    }

    async fn set_reminder_time(&self, id: ProviderId, time: Option<String>) -> Result<Provider> {
        validate_reminder_time(time.as_deref())?;
        let mut t = self.tables.lock().await;
        let row = t
            .providers
            .iter_mut()
            .find(|r| !r.deleted && r.value.id == id)
            .ok_or_else(|| Error::NotFound(format!("provider {id}")))?;
        row.value.reminder_time = time;
        t.provider_with_slots(id)
            .ok_or_else(|| Error::NotFound(format!("provider {id}")))
    }

    async fn provider(&self, id: ProviderId) -> Result<Option<Provider>> {
        Ok(self.tables.lock().await.provider_with_slots(id))
    }

    async fn providers(&self) -> Result<Vec<Provider>> {
        let t = self.tables.lock().await;
        let providers = t
            .providers
            .iter()
            .filter(|r| !r.deleted)
            .filter_map(|r| t.provider_with_slots(r.value.id))
            .collect();
        Ok(providers)
    }

    async fn delete_provider(&self, id: ProviderId) -> Result<()> {
        let mut t = self.tables.lock().await;
        let row = t
            .providers
            .iter_mut()
            .find(|r| !r.deleted && r.value.id == id)
            .ok_or_else(|| Error::NotFound(format!("provider {id}")))?;
        row.deleted = true;
        Ok(())
    }

    async fn create_time_slot(&self, new: NewTimeSlot) -> Result<TimeSlot> {
        validate_time_slot(&new)?;
        let mut t = self.tables.lock().await;
        if !t.provider_live(new.provider_id) {
            return Err(Error::Invalid(format!("unknown provider {}", new.provider_id)));
        }
        let slot = TimeSlot {
            id: TimeSlotId(t.alloc_id()),
            start_hour: new.start_hour,
            end_hour: new.end_hour,
            provider_id: new.provider_id,
        };
        t.slots.push(Row::new(slot));
        Ok(slot)
    }

    async fn time_slots(&self, provider: ProviderId) -> Result<Vec<TimeSlot>> {
        Ok(self.tables.lock().await.slots_of(provider))
    }

    async fn delete_time_slot(&self, id: TimeSlotId) -> Result<()> {
        let mut t = self.tables.lock().await;
        let row = t
            .slots
            .iter_mut()
            .find(|r| !r.deleted && r.value.id == id)
            .ok_or_else(|| Error::NotFound(format!("time slot {id}")))?;
        row.deleted = true;
        Ok(())
    }

    async fn create_order(&self, new: NewOrder) -> Result<Order> {
        datetime::parse_date(&new.delivery_date)?;
        if new.contact_number.trim().is_empty() {
            return Err(Error::Invalid("contact number is required".to_string()));
        }
        let mut t = self.tables.lock().await;
        if !t.provider_live(new.provider_id) {
            return Err(Error::Invalid(format!("unknown provider {}", new.provider_id)));
        }
        let order = Order {
            id: OrderId(t.alloc_id()),
            customer_name: new.customer_name,
            contact_number: new.contact_number.trim().to_string(),
            delivery_date: new.delivery_date.trim().to_string(),
            provider_id: new.provider_id,
            retries_count: 0,
        };
        t.orders.push(Row::new(order.clone()));
        Ok(order)
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        let t = self.tables.lock().await;
        let order = t.live_orders().find(|o| o.id == id).cloned();
        Ok(order)
    }

    async fn active_orders(&self) -> Result<Vec<Order>> {
        let t = self.tables.lock().await;
        let orders = t.live_orders().cloned().collect();
        Ok(orders)
    }

    async fn orders_for_provider(&self, provider: ProviderId) -> Result<Vec<Order>> {
        let t = self.tables.lock().await;
        let orders = t
            .live_orders()
            .filter(|o| o.provider_id == provider)
            .cloned()
            .collect();
        Ok(orders)
    }

    async fn latest_order_for_contact(&self, contact_number: &str) -> Result<Option<Order>> {
        let t = self.tables.lock().await;
        let latest = t
            .live_orders()
            .filter(|o| o.contact_number == contact_number)
            .max_by_key(|o| o.id)
            .cloned();
        Ok(latest)
    }

    async fn delete_order(&self, id: OrderId) -> Result<()> {
        let mut t = self.tables.lock().await;
        let row = t
            .orders
            .iter_mut()
            .find(|r| !r.deleted && r.value.id == id)
            .ok_or_else(|| Error::NotFound(format!("order {id}")))?;
        row.deleted = true;
        Ok(())
    }

    async fn choices(&self, order: OrderId) -> Result<Vec<Choice>> {
        let t = self.tables.lock().await;
        Ok(t.choices
            .iter()
            .filter(|r| !r.deleted && r.value.order_id == order)
            .map(|r| r.value)
            .collect())
    }

    async fn add_choice(&self, order: OrderId, slot: TimeSlotId) -> Result<Choice> {
        let mut t = self.tables.lock().await;
        let provider = t
            .live_orders()
            .find(|o| o.id == order)
            .map(|o| o.provider_id)
            .ok_or_else(|| Error::Invalid(format!("unknown order {order}")))?;
        if !t
            .slots
            .iter()
            .any(|r| !r.deleted && r.value.id == slot && r.value.provider_id == provider)
        {
            return Err(Error::Invalid(format!("unknown time slot {slot}")));
        }

        let choice = Choice {
            order_id: order,
            time_slot_id: slot,
        };
        if !t.choices.iter().any(|r| !r.deleted && r.value == choice) {
            t.choices.push(Row::new(choice));
        }
        Ok(choice)
    }

    async fn delete_choice(&self, order: OrderId, slot: TimeSlotId) -> Result<()> {
        let mut t = self.tables.lock().await;
        let row = t
            .choices
            .iter_mut()
            .find(|r| !r.deleted && r.value.order_id == order && r.value.time_slot_id == slot)
            .ok_or_else(|| Error::NotFound(format!("choice {order}/{slot}")))?;
        row.deleted = true;
        Ok(())
    }

    async fn record_selection(&self, order: OrderId, slots: &[TimeSlotId]) -> Result<Order> {
        let mut t = self.tables.lock().await;

        if !t.live_orders().any(|o| o.id == order) {
            return Err(Error::NotFound(format!("order {order}")));
        }
        for slot in slots {
            if !t.slots.iter().any(|r| !r.deleted && r.value.id == *slot) {
                return Err(Error::Invalid(format!("unknown time slot {slot}")));
            }
        }

        for row in t.choices.iter_mut() {
            if row.value.order_id == order {
                row.deleted = true;
            }
        }
        for slot in slots {
            t.choices.push(Row::new(Choice {
                order_id: order,
                time_slot_id: *slot,
            }));
        }

        let row = t
            .orders
            .iter_mut()
            .find(|r| !r.deleted && r.value.id == order)
            .ok_or_else(|| Error::NotFound(format!("order {order}")))?;
        row.value.retries_count += 1;
        Ok(row.value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (MemoryStore, Provider, Vec<TimeSlot>) {
        let store = MemoryStore::new();
        let p = store
            .create_provider(NewProvider {
                title: "FastShip".to_string(),
                contact_number: "+100".to_string(),
                reminder_time: Some("09".to_string()),
            })
            .await
            .unwrap();
        let mut slots = Vec::new();
        // Inserted out of order on purpose.
        for (s, e) in [(15, 18), (9, 12), (12, 15)] {
            slots.push(
                store
                    .create_time_slot(NewTimeSlot {
                        start_hour: s,
                        end_hour: e,
                        provider_id: p.id,
                    })
                    .await
                    .unwrap(),
            );
        }
        (store, p, slots)
    }

    fn new_order(provider: ProviderId, number: &str) -> NewOrder {
        NewOrder {
            customer_name: "Alice".to_string(),
            contact_number: number.to_string(),
            delivery_date: "2024-06-10".to_string(),
            provider_id: provider,
        }
    }

    #[tokio::test]
    async fn slots_are_ordered_by_start_hour() {
        let (store, p, _) = seeded().await;
        let hours: Vec<u32> = store
            .time_slots(p.id)
            .await
            .unwrap()
            .iter()
            .map(|s| s.start_hour)
            .collect();
        assert_eq!(hours, vec![9, 12, 15]);
        assert_eq!(store.provider(p.id).await.unwrap().unwrap().slots.len(), 3);
    }

    #[tokio::test]
    async fn rejects_bad_slots_and_dates() {
        let (store, p, _) = seeded().await;
        let err = store
            .create_time_slot(NewTimeSlot {
                start_hour: 12,
                end_hour: 12,
                provider_id: p.id,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Invalid(_)));

        let mut bad = new_order(p.id, "+1");
        bad.delivery_date = "2024-13-01".to_string();
        assert!(matches!(
            store.create_order(bad).await,
            Err(Error::InvalidMonth(13))
        ));
    }

    #[tokio::test]
    async fn latest_order_for_contact_prefers_newest_live_order() {
        let (store, p, _) = seeded().await;
        let first = store.create_order(new_order(p.id, "+1")).await.unwrap();
        let second = store.create_order(new_order(p.id, "+1")).await.unwrap();
        assert_eq!(
            store.latest_order_for_contact("+1").await.unwrap().unwrap().id,
            second.id
        );

        store.delete_order(second.id).await.unwrap();
        assert_eq!(
            store.latest_order_for_contact("+1").await.unwrap().unwrap().id,
            first.id
        );

        store.delete_provider(p.id).await.unwrap();
        assert!(store.latest_order_for_contact("+1").await.unwrap().is_none());
        assert!(store.active_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn record_selection_replaces_choices_and_bumps_retries() {
        let (store, p, slots) = seeded().await;
        let o = store.create_order(new_order(p.id, "+1")).await.unwrap();

        store.record_selection(o.id, &[slots[0].id]).await.unwrap();
        let updated = store
            .record_selection(o.id, &[slots[1].id, slots[2].id])
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
        assert_eq!(chosen, vec![slots[1].id, slots[2].id]);
    }

    #[tokio::test]
    async fn deleted_slot_disappears_from_provider() {
        let (store, p, slots) = seeded().await;
        store.delete_time_slot(slots[1].id).await.unwrap();
        let remaining = store.provider(p.id).await.unwrap().unwrap().slots;
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|s| s.id != slots[1].id));
        assert!(matches!(
            store.delete_time_slot(slots[1].id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn providers_lists_live_providers_with_slots() {
        let (store, p, _) = seeded().await;
        let other = store
            .create_provider(NewProvider {
                title: "SlowShip".to_string(),
                contact_number: "+200".to_string(),
                reminder_time: None,
            })
            .await
            .unwrap();

        let all = store.providers().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, p.id);
        assert_eq!(all[0].slots.len(), 3);
        assert!(all[1].slots.is_empty());

        store.delete_provider(other.id).await.unwrap();
        assert_eq!(store.providers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn manual_choices_are_validated_and_leave_retries_alone() {
        let (store, p, slots) = seeded().await;
        let o = store.create_order(new_order(p.id, "+1")).await.unwrap();

        store.add_choice(o.id, slots[0].id).await.unwrap();
        // Adding the same slot twice keeps one choice.
        store.add_choice(o.id, slots[0].id).await.unwrap();
        assert_eq!(store.choices(o.id).await.unwrap().len(), 1);
        assert_eq!(store.order(o.id).await.unwrap().unwrap().retries_count, 0);

        assert!(matches!(
            store.add_choice(OrderId(999), slots[0].id).await,
            Err(Error::Invalid(_))
        ));
        assert!(matches!(
            store.add_choice(o.id, TimeSlotId(999)).await,
            Err(Error::Invalid(_))
        ));

        let other = store
            .create_provider(NewProvider {
                title: "SlowShip".to_string(),
                contact_number: "+200".to_string(),
                reminder_time: None,
            })
            .await
            .unwrap();
        let foreign = store
            .create_time_slot(NewTimeSlot {
                start_hour: 8,
                end_hour: 10,
                provider_id: other.id,
            })
            .await
            .unwrap();
        assert!(matches!(
            store.add_choice(o.id, foreign.id).await,
            Err(Error::Invalid(_))
        ));

        store.delete_choice(o.id, slots[0].id).await.unwrap();
        assert!(store.choices(o.id).await.unwrap().is_empty());
        assert!(matches!(
            store.delete_choice(o.id, slots[0].id).await,
            Err(Error::NotFound(_))
        ));
    }
}
