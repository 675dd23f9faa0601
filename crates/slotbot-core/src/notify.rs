//! SMS bodies sent to customers.
//!
//! Pure string construction; callers decide when and where to send.

use chrono::NaiveDate;

use crate::domain::{Order, Provider, TimeSlot};

/// Render a slot's hours, e.g. `09:00-12:00`.
pub fn slot_label(slot: &TimeSlot) -> String {
    format!("{:02}:00-{:02}:00", slot.start_hour, slot.end_hour)
}

/// Zero-indexed slot list, one `"<index>: <start>-<end>"` per line.
pub fn slot_list(slots: &[TimeSlot]) -> String {
    slots
        .iter()
        .enumerate()
        .map(|(idx, s)| format!("{idx}: {}\n", slot_label(s)))
        .collect()
}

/// Day-before reminder asking the customer to pick slots.
pub fn reminder_message(provider: &Provider, order: &Order, delivery_date: NaiveDate) -> String {
    format!(
        "From: {title}\n\
Hello {name}, your delivery is scheduled to be delivered tomorrow {date}. \
Please state your available time slots by replying the number beside the time slot. \
If you're available for more than one time slot, reply with a space between the numbers. E.g 1 2 4\n\
Ignore this message if it's not meant for you.\n\n\
{slots}",
        title = provider.title,
        name = order.customer_name,
        date = delivery_date.format("%a %Y %b %d"),
        slots = slot_list(&provider.slots),
    )
}

/// Confirms the slots the customer picked.
pub fn confirmation_message(order: &Order, chosen: &[TimeSlot]) -> String {
    let picked = chosen.iter().map(slot_label).collect::<Vec<_>>().join(", ");
    format!(
        "Thank you {name}! You have chosen the following time slot(s): {picked}.\n\
Our driver will try to deliver within your chosen time, but exact arrival cannot be guaranteed.\n\
If this is wrong, reply WRONG to choose again.",
        name = order.customer_name,
    )
}

/// Re-sends the slot list after a WRONG reply.
pub fn retry_message(slots: &[TimeSlot], last_chance: bool) -> String {
    let mut out = String::new();
    if last_chance {
        out.push_str(
            "WARNING: this is your last chance to change your time slots. \
Your next reply will be final.\n\n",
        );
    }
    out.push_str(
        "Please reply with the number(s) of your available time slot(s), separated by spaces:\n\n",
    );
    out.push_str(&slot_list(slots));
    out
}

/// Sent once a customer has used up their replies.
pub fn max_exceeded_message(provider: &Provider) -> String {
    format!(
        "You have reached the maximum number of changes for this delivery. \
Please call {title} at {number} to arrange your time slot.",
        title = provider.title,
        number = provider.contact_number,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderId, ProviderId, TimeSlotId};

    fn slots() -> Vec<TimeSlot> {
        [(9, 12), (12, 15), (15, 18)]
            .into_iter()
            .enumerate()
            .map(|(i, (start_hour, end_hour))| TimeSlot {
                id: TimeSlotId(i as i64 + 10),
                start_hour,
                end_hour,
                provider_id: ProviderId(1),
            })
            .collect()
    }

    fn provider() -> Provider {
        Provider {
            id: ProviderId(1),
            title: "FastShip".to_string(),
            contact_number: "+6560000000".to_string(),
            reminder_time: Some("09".to_string()),
            slots: slots(),
        }
    }

    fn order() -> Order {
        Order {
            id: OrderId(7),
            customer_name: "Alice".to_string(),
            contact_number: "+6591234567".to_string(),
            delivery_date: "2024-06-10".to_string(),
            provider_id: ProviderId(1),
            retries_count: 0,
        }
    }

    #[test]
    fn reminder_lists_zero_indexed_slots_and_date() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let msg = reminder_message(&provider(), &order(), date);
        assert!(msg.starts_with("From: FastShip\n"));
        assert!(msg.contains("Hello Alice"));
        assert!(msg.contains("Mon 2024 Jun 10"));
        assert!(msg.ends_with("0: 09:00-12:00\n1: 12:00-15:00\n2: 15:00-18:00\n"));
    }

    #[test]
    fn confirmation_joins_chosen_slots() {
        let s = slots();
        let msg = confirmation_message(&order(), &s[1..]);
        assert!(msg.contains("Alice"));
        assert!(msg.contains("12:00-15:00, 15:00-18:00"));
        assert!(msg.contains("reply WRONG"));
    }

    #[test]
    fn retry_warns_only_on_last_chance() {
        let plain = retry_message(&slots(), false);
        let last = retry_message(&slots(), true);
        assert!(!plain.contains("last chance"));
        assert!(last.starts_with("WARNING"));
        assert!(last.ends_with(&plain));
    }

    #[test]
    fn max_exceeded_points_to_provider_number() {
        let msg = max_exceeded_message(&provider());
        assert!(msg.contains("+6560000000"));
    }
}
