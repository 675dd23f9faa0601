use serde::{Deserialize, Serialize};

/// Replies allowed before an order is considered exhausted.
pub const MAX_RETRIES: u32 = 3;

/// Provider id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(pub i64);

/// Time slot id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeSlotId(pub i64);

/// Order id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub i64);

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for TimeSlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A logistics provider.
///
/// `slots` holds the provider's non-deleted time slots ordered by start hour; the
/// position in that list is the index customers reply with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: ProviderId,
    pub title: String,
    pub contact_number: String,
    /// `HH` or `HH:MM` (UTC). `None` means no reminders are scheduled.
    pub reminder_time: Option<String>,
    #[serde(default)]
    pub slots: Vec<TimeSlot>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: TimeSlotId,
    pub start_hour: u32,
    pub end_hour: u32,
    pub provider_id: ProviderId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_name: String,
    /// Correlation key for inbound replies.
    pub contact_number: String,
    /// `YYYY-MM-DD`.
    pub delivery_date: String,
    pub provider_id: ProviderId,
    pub retries_count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub order_id: OrderId,
    pub time_slot_id: TimeSlotId,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewProvider {
    pub title: String,
    pub contact_number: String,
    #[serde(default)]
    pub reminder_time: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewTimeSlot {
    pub start_hour: u32,
    pub end_hour: u32,
    pub provider_id: ProviderId,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewOrder {
    pub customer_name: String,
    pub contact_number: String,
    pub delivery_date: String,
    pub provider_id: ProviderId,
}

/// Reply state of an order, derived from the stored counters at read time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyState {
    AwaitingReply,
    HasChoices,
    Exhausted,
}

impl ReplyState {
    pub fn derive(retries_count: u32, has_choices: bool) -> Self {
        if retries_count >= MAX_RETRIES {
            ReplyState::Exhausted
        } else if has_choices {
            ReplyState::HasChoices
        } else {
            ReplyState::AwaitingReply
        }
    }

    /// State after a successful slot selection bumped the counter to `retries_count`.
    pub fn after_selection(retries_count: u32) -> Self {
        Self::derive(retries_count, true)
    }
}

/// The customer's next reply is their final one before exhaustion.
pub fn is_last_chance(retries_count: u32) -> bool {
    retries_count == MAX_RETRIES - 1
}

pub fn is_exhausted(retries_count: u32) -> bool {
    retries_count >= MAX_RETRIES
}
