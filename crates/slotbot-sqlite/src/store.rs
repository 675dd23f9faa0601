use async_trait::async_trait;
use rusqlite::params;
use slotbot_core::{
    datetime,
    domain::{
        Choice, NewOrder, NewProvider, NewTimeSlot, Order, OrderId, Provider, ProviderId,
        TimeSlot, TimeSlotId,
    },
    errors::Error,
    store::{validate_reminder_time, validate_time_slot, Store},
    Result,
};

use crate::{rows, storage_err, SqliteStore};

#[async_trait]
impl Store for SqliteStore {
    async fn create_provider(&self, new: NewProvider) -> Result<Provider> {
        validate_reminder_time(new.reminder_time.as_deref())?;
        self.conn
            .call(move |conn| -> rows::SqlResult<Provider> {
                conn.execute(
                    "INSERT INTO providers (title, contact_number, reminder_time) VALUES (?1, ?2, ?3)",
                    params![new.title, new.contact_number, new.reminder_time],
                )?;
                Ok(Provider {
                    id: ProviderId(conn.last_insert_rowid()),
                    title: new.title,
                    contact_number: new.contact_number,
                    reminder_time: new.reminder_time,
                    slots: Vec::new(),
                })
            })
            .await
            .map_err(storage_err)
    }

    async fn set_reminder_time(&self, id: ProviderId, time: Option<String>) -> Result<Provider> {
        validate_reminder_time(time.as_deref())?;
        self.conn
            .call(move |conn| -> rows::SqlResult<Option<Provider>> {
                let changed = conn.execute(
                    "UPDATE providers SET reminder_time = ?1 WHERE id = ?2 AND deleted = 0",
                    params![time, id.0],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                rows::provider(conn, id)
            })
            .await
            .map_err(storage_err)?
            .ok_or_else(|| Error::NotFound(format!("provider {id}")))
    }

    async fn provider(&self, id: ProviderId) -> Result<Option<Provider>> {
        self.conn
            .call(move |conn| -> rows::SqlResult<Option<Provider>> { rows::provider(conn, id) })
            .await
            .map_err(storage_err)
    }

    async fn providers(&self) -> Result<Vec<Provider>> {
        self.conn
            .call(|conn| -> rows::SqlResult<Vec<Provider>> {
                let mut stmt =
                    conn.prepare("SELECT id FROM providers WHERE deleted = 0 ORDER BY id ASC")?;
                let ids = stmt
                    .query_map([], |row| row.get::<_, i64>(0))?
                    .collect::<rows::SqlResult<Vec<i64>>>()?;
                let mut out = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(p) = rows::provider(conn, ProviderId(id))? {
                        out.push(p);
                    }
                }
                Ok(out)
            })
            .await
            .map_err(storage_err)
    }

    async fn delete_provider(&self, id: ProviderId) -> Result<()> {
        let deleted = self
            .conn
            .call(move |conn| -> rows::SqlResult<bool> {
                rows::soft_delete(conn, "providers", id.0)
            })
            .await
            .map_err(storage_err)?;
        if !deleted {
            return Err(Error::NotFound(format!("provider {id}")));
        }
        Ok(())
    }

    async fn create_time_slot(&self, new: NewTimeSlot) -> Result<TimeSlot> {
        validate_time_slot(&new)?;
        self.conn
            .call(move |conn| -> rows::SqlResult<Option<TimeSlot>> {
                if !rows::provider_live(conn, new.provider_id)? {
                    return Ok(None);
                }
                conn.execute(
                    "INSERT INTO time_slots (start_hour, end_hour, provider_id) VALUES (?1, ?2, ?3)",
                    params![new.start_hour, new.end_hour, new.provider_id.0],
                )?;
                Ok(Some(TimeSlot {
                    id: TimeSlotId(conn.last_insert_rowid()),
                    start_hour: new.start_hour,
                    end_hour: new.end_hour,
                    provider_id: new.provider_id,
                }))
            })
            .await
            .map_err(storage_err)?
            .ok_or_else(|| Error::Invalid(format!("unknown provider {}", new.provider_id)))
    }

    async fn time_slots(&self, provider: ProviderId) -> Result<Vec<TimeSlot>> {
        self.conn
            .call(move |conn| -> rows::SqlResult<Vec<TimeSlot>> { rows::slots_of(conn, provider) })
            .await
            .map_err(storage_err)
    }

    async fn delete_time_slot(&self, id: TimeSlotId) -> Result<()> {
        let deleted = self
            .conn
            .call(move |conn| -> rows::SqlResult<bool> {
                rows::soft_delete(conn, "time_slots", id.0)
            })
            .await
            .map_err(storage_err)?;
        if !deleted {
            return Err(Error::NotFound(format!("time slot {id}")));
        }
        Ok(())
    }

    async fn create_order(&self, new: NewOrder) -> Result<Order> {
        datetime::parse_date(&new.delivery_date)?;
        if new.contact_number.trim().is_empty() {
            return Err(Error::Invalid("contact number is required".to_string()));
        }
        let provider_id = new.provider_id;
        self.conn
            .call(move |conn| -> rows::SqlResult<Option<Order>> {
                if !rows::provider_live(conn, new.provider_id)? {
                    return Ok(None);
                }
                let contact_number = new.contact_number.trim().to_string();
                let delivery_date = new.delivery_date.trim().to_string();
                conn.execute(
                    "INSERT INTO orders (customer_name, contact_number, delivery_date, provider_id)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![new.customer_name, contact_number, delivery_date, new.provider_id.0],
                )?;
                Ok(Some(Order {
                    id: OrderId(conn.last_insert_rowid()),
                    customer_name: new.customer_name,
                    contact_number,
                    delivery_date,
                    provider_id: new.provider_id,
                    retries_count: 0,
                }))
            })
            .await
            .map_err(storage_err)?
            .ok_or_else(|| Error::Invalid(format!("unknown provider {provider_id}")))
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        self.conn
            .call(move |conn| -> rows::SqlResult<Option<Order>> { rows::order(conn, id) })
            .await
            .map_err(storage_err)
    }

    async fn active_orders(&self) -> Result<Vec<Order>> {
        self.conn
            .call(|conn| -> rows::SqlResult<Vec<Order>> {
                rows::orders_where(conn, "ORDER BY o.id ASC", [])
            })
            .await
            .map_err(storage_err)
    }

    async fn orders_for_provider(&self, provider: ProviderId) -> Result<Vec<Order>> {
        self.conn
            .call(move |conn| -> rows::SqlResult<Vec<Order>> {
                rows::orders_where(
                    conn,
                    "AND o.provider_id = ?1 ORDER BY o.id ASC",
                    params![provider.0],
                )
            })
            .await
            .map_err(storage_err)
    }

    async fn latest_order_for_contact(&self, contact_number: &str) -> Result<Option<Order>> {
        let contact_number = contact_number.to_string();
        let mut found = self
            .conn
            .call(move |conn| -> rows::SqlResult<Vec<Order>> {
                rows::orders_where(
                    conn,
                    "AND o.contact_number = ?1 ORDER BY o.id DESC LIMIT 1",
                    params![contact_number],
                )
            })
            .await
            .map_err(storage_err)?;
        Ok(found.pop())
    }

    async fn delete_order(&self, id: OrderId) -> Result<()> {
        let deleted = self
            .conn
            .call(move |conn| -> rows::SqlResult<bool> { rows::soft_delete(conn, "orders", id.0) })
            .await
            .map_err(storage_err)?;
        if !deleted {
            return Err(Error::NotFound(format!("order {id}")));
        }
        Ok(())
    }

    async fn choices(&self, order: OrderId) -> Result<Vec<Choice>> {
        self.conn
            .call(move |conn| -> rows::SqlResult<Vec<Choice>> {
                let mut stmt = conn.prepare(
                    "SELECT order_id, time_slot_id FROM choices
                     WHERE order_id = ?1 AND deleted = 0
                     ORDER BY id ASC",
                )?;
                let rows = stmt.query_map(params![order.0], |row| {
                    Ok(Choice {
                        order_id: OrderId(row.get(0)?),
                        time_slot_id: TimeSlotId(row.get(1)?),
                    })
                })?;
                rows.collect()
            })
            .await
            .map_err(storage_err)
    }

    async fn add_choice(&self, order: OrderId, slot: TimeSlotId) -> Result<Choice> {
        self.conn
            .call(move |conn| -> rows::SqlResult<Result<Choice>> {
                let tx = conn.transaction()?;

                let Some(o) = rows::order(&tx, order)? else {
                    return Ok(Err(Error::Invalid(format!("unknown order {order}"))));
                };
                let owned: bool = tx.query_row(
                    "SELECT EXISTS (SELECT 1 FROM time_slots
                                    WHERE id = ?1 AND provider_id = ?2 AND deleted = 0)",
                    params![slot.0, o.provider_id.0],
                    |row| row.get(0),
                )?;
                if !owned {
                    return Ok(Err(Error::Invalid(format!("unknown time slot {slot}"))));
                }

                let held: bool = tx.query_row(
                    "SELECT EXISTS (SELECT 1 FROM choices
                                    WHERE order_id = ?1 AND time_slot_id = ?2 AND deleted = 0)",
                    params![order.0, slot.0],
                    |row| row.get(0),
                )?;
                if !held {
                    tx.execute(
                        "INSERT INTO choices (order_id, time_slot_id) VALUES (?1, ?2)",
                        params![order.0, slot.0],
                    )?;
                }
                tx.commit()?;
                Ok(Ok(Choice {
                    order_id: order,
                    time_slot_id: slot,
                }))
            })
            .await
            .map_err(storage_err)?
    }

    async fn delete_choice(&self, order: OrderId, slot: TimeSlotId) -> Result<()> {
        let changed = self
            .conn
            .call(move |conn| -> rows::SqlResult<usize> {
                conn.execute(
                    "UPDATE choices SET deleted = 1
                     WHERE order_id = ?1 AND time_slot_id = ?2 AND deleted = 0",
                    params![order.0, slot.0],
                )
            })
            .await
            .map_err(storage_err)?;
        if changed == 0 {
            return Err(Error::NotFound(format!("choice {order}/{slot}")));
        }
        Ok(())
    }

    async fn record_selection(&self, order: OrderId, slots: &[TimeSlotId]) -> Result<Order> {
        let slots = slots.to_vec();
        self.conn
            .call(move |conn| -> rows::SqlResult<Result<Order>> {
                // Dropping the transaction without commit rolls every statement back.
                let tx = conn.transaction()?;

                if rows::order(&tx, order)?.is_none() {
                    return Ok(Err(Error::NotFound(format!("order {order}"))));
                }
                for slot in &slots {
                    if !rows::slot_live(&tx, *slot)? {
                        return Ok(Err(Error::Invalid(format!("unknown time slot {slot}"))));
                    }
                }

                tx.execute(
                    "UPDATE choices SET deleted = 1 WHERE order_id = ?1 AND deleted = 0",
                    params![order.0],
                )?;
                for slot in &slots {
                    tx.execute(
                        "INSERT INTO choices (order_id, time_slot_id) VALUES (?1, ?2)",
                        params![order.0, slot.0],
                    )?;
                }
                tx.execute(
                    "UPDATE orders SET retries_count = retries_count + 1 WHERE id = ?1",
                    params![order.0],
                )?;

                let updated = rows::order(&tx, order)?;
                tx.commit()?;
                Ok(updated.ok_or_else(|| Error::NotFound(format!("order {order}"))))
            })
            .await
            .map_err(storage_err)?
    }
}
