//! Storage port for providers, time slots, orders and choices.
//!
//! Deletes are soft: a deleted row never shows up in any read again.

use async_trait::async_trait;

use crate::{
    domain::{
        Choice, NewOrder, NewProvider, NewTimeSlot, Order, OrderId, Provider, ProviderId,
        TimeSlot, TimeSlotId,
    },
    Result,
};

pub mod memory;

pub use memory::MemoryStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_provider(&self, new: NewProvider) -> Result<Provider>;

    /// Set (or clear with `None`) the provider's daily reminder time.
    async fn set_reminder_time(&self, id: ProviderId, time: Option<String>) -> Result<Provider>;

    /// Non-deleted provider with its ordered, non-deleted time slots.
    async fn provider(&self, id: ProviderId) -> Result<Option<Provider>>;

    /// Every non-deleted provider with its slots, ordered by id.
    async fn providers(&self) -> Result<Vec<Provider>>;

    async fn delete_provider(&self, id: ProviderId) -> Result<()>;

    async fn create_time_slot(&self, new: NewTimeSlot) -> Result<TimeSlot>;

    /// Non-deleted slots ordered by start hour (ties by id).
    async fn time_slots(&self, provider: ProviderId) -> Result<Vec<TimeSlot>>;

    async fn delete_time_slot(&self, id: TimeSlotId) -> Result<()>;

    async fn create_order(&self, new: NewOrder) -> Result<Order>;

    async fn order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Every non-deleted order whose provider is also non-deleted.
    async fn active_orders(&self) -> Result<Vec<Order>>;

    async fn orders_for_provider(&self, provider: ProviderId) -> Result<Vec<Order>>;

    /// The most recently created active order for a contact number.
    async fn latest_order_for_contact(&self, contact_number: &str) -> Result<Option<Order>>;

    async fn delete_order(&self, id: OrderId) -> Result<()>;

    /// Non-deleted choices of an order.
    async fn choices(&self, order: OrderId) -> Result<Vec<Choice>>;

    /// Record one slot for an order without touching `retries_count`.
    ///
    /// The order and slot must be live and the slot must belong to the order's
    /// provider, otherwise the call fails with `Error::Invalid`. Adding a
    /// slot the order already holds returns the existing choice.
    async fn add_choice(&self, order: OrderId, slot: TimeSlotId) -> Result<Choice>;

    async fn delete_choice(&self, order: OrderId, slot: TimeSlotId) -> Result<()>;

    /// Atomically replace the order's choices and bump its retry counter.
    ///
    /// Prior choices are soft-deleted, one choice per slot is inserted and
    /// `retries_count` goes up by one. Returns the updated order.
    async fn record_selection(&self, order: OrderId, slots: &[TimeSlotId]) -> Result<Order>;
}

/// Shared validation for new time slots.
pub fn validate_time_slot(new: &NewTimeSlot) -> Result<()> {
    if new.end_hour > 24 || new.start_hour >= new.end_hour {
        return Err(crate::Error::Invalid(format!(
            "invalid time slot {}-{}",
            new.start_hour, new.end_hour
        )));
    }
    Ok(())
}

/// Shared validation for reminder times (`HH` / `HH:MM`).
pub fn validate_reminder_time(time: Option<&str>) -> Result<()> {
    if let Some(t) = time {
        crate::datetime::parse_time_of_day(t)?;
    }
    Ok(())
}
