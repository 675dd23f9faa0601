//! Inbound reply handling: classify a customer's SMS and apply it to their order.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex, MutexGuard, OnceLock, PoisonError},
};

use regex::Regex;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::{
    domain::{is_exhausted, is_last_chance, Order, OrderId, ReplyState, TimeSlot, TimeSlotId},
    messaging::port::SmsPort,
    notify,
    store::Store,
    Error, Result,
};

/// Keyword a customer sends to get the slot list again.
pub const RETRY_KEYWORD: &str = "WRONG";

/// What an inbound body asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyKind {
    /// Zero-based slot indices as typed by the customer (not yet validated).
    SlotSelection(Vec<String>),
    RetryRequest,
}

/// What the interpreter did with a reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyOutcome {
    Selected {
        order_id: OrderId,
        slots: Vec<TimeSlot>,
        state: ReplyState,
    },
    RetrySent {
        order_id: OrderId,
        last_chance: bool,
        max_exceeded: bool,
    },
}

fn selection_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9\s]+$").expect("valid regex"))
}

/// Classify a reply body. Touches no storage.
pub fn classify(body: &str) -> Result<ReplyKind> {
    let body = body.trim();
    if body.is_empty() {
        return Err(Error::EmptyMessage);
    }
    if selection_pattern().is_match(body) {
        return Ok(ReplyKind::SlotSelection(
            body.split_whitespace().map(str::to_string).collect(),
        ));
    }
    if body.eq_ignore_ascii_case(RETRY_KEYWORD) {
        return Ok(ReplyKind::RetryRequest);
    }
    Err(Error::InvalidReply)
}

/// Map typed indices onto the provider's slot list.
///
/// Out-of-range or unparsable tokens are ignored; repeats collapse to one choice.
pub fn select_slots(tokens: &[String], slots: &[TimeSlot]) -> Vec<TimeSlot> {
    let mut out: Vec<TimeSlot> = Vec::new();
    for token in tokens {
        let Ok(idx) = token.parse::<usize>() else {
            continue;
        };
        let Some(slot) = slots.get(idx) else {
            continue;
        };
        if !out.iter().any(|s| s.id == slot.id) {
            out.push(*slot);
        }
    }
    out
}

/// Serialises replies per order so two webhooks for the same customer cannot
/// interleave their read-modify-write of the order.
#[derive(Default)]
pub struct OrderLocks {
    inner: StdMutex<HashMap<OrderId, Arc<Mutex<()>>>>,
}

/// Holds one order's lock. The map entry goes away with the last holder.
pub struct OrderLockGuard<'a> {
    locks: &'a OrderLocks,
    order_id: OrderId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl OrderLocks {
    fn map(&self) -> MutexGuard<'_, HashMap<OrderId, Arc<Mutex<()>>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn lock(&self, order_id: OrderId) -> OrderLockGuard<'_> {
        let lock = self
            .map()
            .entry(order_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        OrderLockGuard {
            locks: self,
            order_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}

impl Drop for OrderLockGuard<'_> {
    fn drop(&mut self) {
        let mut map = self.locks.map();
        drop(self.guard.take());
        // Waiters clone the Arc under the map lock, so a count of one means none.
        if map
            .get(&self.order_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(&self.order_id);
        }
    }
}

pub struct ReplyInterpreter {
    store: Arc<dyn Store>,
    sms: Arc<dyn SmsPort>,
    locks: OrderLocks,
}

impl ReplyInterpreter {
    pub fn new(store: Arc<dyn Store>, sms: Arc<dyn SmsPort>) -> Self {
        Self {
            store,
            sms,
            locks: OrderLocks::default(),
        }
    }

    /// Handle one inbound SMS from `from`.
    ///
    /// Classification errors are returned before any storage access. Replies are
    /// matched to the most recently created active order for the number.
    pub async fn respond(&self, from: &str, body: &str) -> Result<ReplyOutcome> {
        let kind = classify(body)?;
        let from = from.trim();

        let order = self
            .store
            .latest_order_for_contact(from)
            .await?
            .ok_or(Error::OrderNotFound)?;

        let _guard = self.locks.lock(order.id).await;
        // Re-read under the lock: a concurrent reply may have bumped the counter.
        let order = self
            .store
            .order(order.id)
            .await?
            .ok_or(Error::OrderNotFound)?;

        match kind {
            ReplyKind::SlotSelection(tokens) => self.select(order, &tokens).await,
            ReplyKind::RetryRequest => self.retry(order).await,
        }
    }

    async fn select(&self, order: Order, tokens: &[String]) -> Result<ReplyOutcome> {
        let slots = self.store.time_slots(order.provider_id).await?;
        let chosen = select_slots(tokens, &slots);
        if chosen.is_empty() {
            return Err(Error::NoChoiceMade);
        }

        let ids: Vec<TimeSlotId> = chosen.iter().map(|s| s.id).collect();
        let updated = self.store.record_selection(order.id, &ids).await?;
        let state = ReplyState::after_selection(updated.retries_count);
        info!(
            order_id = %order.id,
            chosen = ids.len(),
            retries = updated.retries_count,
            "time slots recorded"
        );

        self.send(&updated, &notify::confirmation_message(&updated, &chosen))
            .await;

        Ok(ReplyOutcome::Selected {
            order_id: updated.id,
            slots: chosen,
            state,
        })
    }

    async fn retry(&self, order: Order) -> Result<ReplyOutcome> {
        let provider = self
            .store
            .provider(order.provider_id)
            .await?
            .ok_or(Error::OrderNotFound)?;

        // Both checks apply independently; on some counts both messages go out.
        let max_exceeded = is_exhausted(order.retries_count);
        let last_chance = is_last_chance(order.retries_count);

        if max_exceeded {
            self.send(&order, &notify::max_exceeded_message(&provider))
                .await;
        }
        self.send(&order, &notify::retry_message(&provider.slots, last_chance))
            .await;

        info!(order_id = %order.id, last_chance, max_exceeded, "retry requested");
        Ok(ReplyOutcome::RetrySent {
            order_id: order.id,
            last_chance,
            max_exceeded,
        })
    }

    /// Best-effort: failures are logged, never retried or surfaced.
    async fn send(&self, order: &Order, body: &str) {
        if let Err(e) = self.sms.send(&order.contact_number, body).await {
            warn!(order_id = %order.id, to = %order.contact_number, "reply send failed: {e}");
        }
    }
}
