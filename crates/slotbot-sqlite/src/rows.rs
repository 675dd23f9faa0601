//! Synchronous row helpers run inside `Connection::call`.

use rusqlite::{params, Connection, OptionalExtension, Row};
use slotbot_core::domain::{Order, OrderId, Provider, ProviderId, TimeSlot, TimeSlotId};

pub(crate) type SqlResult<T> = std::result::Result<T, rusqlite::Error>;

/// Orders that are live and whose provider is live.
const LIVE_ORDERS: &str = "SELECT o.id, o.customer_name, o.contact_number, o.delivery_date,
            o.provider_id, o.retries_count
     FROM orders o
     JOIN providers p ON p.id = o.provider_id
     WHERE o.deleted = 0 AND p.deleted = 0";

fn order_from_row(row: &Row<'_>) -> SqlResult<Order> {
    Ok(Order {
        id: OrderId(row.get(0)?),
        customer_name: row.get(1)?,
        contact_number: row.get(2)?,
        delivery_date: row.get(3)?,
        provider_id: ProviderId(row.get(4)?),
        retries_count: row.get(5)?,
    })
}

fn slot_from_row(row: &Row<'_>) -> SqlResult<TimeSlot> {
    Ok(TimeSlot {
        id: TimeSlotId(row.get(0)?),
        start_hour: row.get(1)?,
        end_hour: row.get(2)?,
        provider_id: ProviderId(row.get(3)?),
    })
}

pub(crate) fn provider_live(conn: &Connection, id: ProviderId) -> SqlResult<bool> {
    conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM providers WHERE id = ?1 AND deleted = 0)",
        params![id.0],
        |row| row.get(0),
    )
}

pub(crate) fn slots_of(conn: &Connection, provider: ProviderId) -> SqlResult<Vec<TimeSlot>> {
    let mut stmt = conn.prepare(
        "SELECT id, start_hour, end_hour, provider_id
         FROM time_slots
         WHERE provider_id = ?1 AND deleted = 0
         ORDER BY start_hour ASC, id ASC",
    )?;
    let rows = stmt.query_map(params![provider.0], slot_from_row)?;
    rows.collect()
}

pub(crate) fn slot_live(conn: &Connection, id: TimeSlotId) -> SqlResult<bool> {
    conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM time_slots WHERE id = ?1 AND deleted = 0)",
        params![id.0],
        |row| row.get(0),
    )
}

pub(crate) fn provider(conn: &Connection, id: ProviderId) -> SqlResult<Option<Provider>> {
    let found = conn
        .query_row(
            "SELECT id, title, contact_number, reminder_time
             FROM providers WHERE id = ?1 AND deleted = 0",
            params![id.0],
            |row| {
                Ok(Provider {
                    id: ProviderId(row.get(0)?),
                    title: row.get(1)?,
                    contact_number: row.get(2)?,
                    reminder_time: row.get(3)?,
                    slots: Vec::new(),
                })
            },
        )
        .optional()?;
    let Some(mut p) = found else {
        return Ok(None);
    };
    p.slots = slots_of(conn, id)?;
    Ok(Some(p))
}

pub(crate) fn order(conn: &Connection, id: OrderId) -> SqlResult<Option<Order>> {
    conn.query_row(
        &format!("{LIVE_ORDERS} AND o.id = ?1"),
        params![id.0],
        order_from_row,
    )
    .optional()
}

pub(crate) fn orders_where(
    conn: &Connection,
    filter: &str,
    args: impl rusqlite::Params,
) -> SqlResult<Vec<Order>> {
    let mut stmt = conn.prepare(&format!("{LIVE_ORDERS} {filter}"))?;
    let rows = stmt.query_map(args, order_from_row)?;
    rows.collect()
}

/// Soft-delete one live row. Returns false when nothing live matched.
pub(crate) fn soft_delete(conn: &Connection, table: &str, id: i64) -> SqlResult<bool> {
    let changed = conn.execute(
        &format!("UPDATE {table} SET deleted = 1 WHERE id = ?1 AND deleted = 0"),
        params![id],
    )?;
    Ok(changed > 0)
}
