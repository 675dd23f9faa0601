use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use tracing::info;

use crate::{
    messaging::{
        port::SmsPort,
        types::{OutboundSms, SendReceipt},
    },
    Result,
};

const OUTBOX_CAPACITY: usize = 1_000;

/// Transport that logs instead of sending.
///
/// Keeps the most recent messages in memory so they can be inspected locally
/// (and asserted on in tests).
#[derive(Debug, Default)]
pub struct DryRunSms {
    outbox: Mutex<VecDeque<OutboundSms>>,
    next_id: AtomicU64,
}

impl DryRunSms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far, oldest first.
    pub fn outbox(&self) -> Vec<OutboundSms> {
        match self.outbox.lock() {
            Ok(q) => q.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    /// Messages sent to one number, oldest first.
    pub fn sent_to(&self, number: &str) -> Vec<String> {
        self.outbox()
            .into_iter()
            .filter(|m| m.to == number)
            .map(|m| m.body)
            .collect()
    }
}

#[async_trait]
impl SmsPort for DryRunSms {
    async fn send(&self, to: &str, body: &str) -> Result<SendReceipt> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        info!(to, chars = body.chars().count(), "dry-run sms");

        let mut q = match self.outbox.lock() {
            Ok(q) => q,
            Err(poisoned) => poisoned.into_inner(),
        };
        if q.len() >= OUTBOX_CAPACITY {
            q.pop_front();
        }
        q.push_back(OutboundSms {
            to: to.to_string(),
            body: body.to_string(),
        });

        Ok(SendReceipt {
            sid: Some(format!("DRY{id:010}")),
            status: Some("queued".to_string()),
        })
    }
}
