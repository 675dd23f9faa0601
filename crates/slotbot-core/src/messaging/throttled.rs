use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    messaging::{port::SmsPort, types::SendReceipt},
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* two sends (account-wide carrier limit).
    pub global_min_interval: Duration,
    /// Minimum spacing between sends to the same number.
    pub per_number_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40),
            per_number_min_interval: Duration::from_millis(1050),
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// SmsPort decorator that spaces out outbound sends.
///
/// Reminders for many orders can fire in the same second after a bootstrap, so
/// this keeps us under the carrier's per-account and per-number rates.
pub struct ThrottledSms {
    inner: Arc<dyn SmsPort>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_number: Mutex<HashMap<String, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledSms {
    pub fn new(inner: Arc<dyn SmsPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_number: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for(&self, number: &str) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_number.lock().await;
        map.entry(number.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_number_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle(&self, number: &str) {
        let global_wait = { self.global.lock().await.reserve() };
        let number_wait = {
            let lim = self.limiter_for(number).await;
            let mut guard = lim.lock().await;
            guard.reserve()
        };

        let wait = global_wait.max(number_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl SmsPort for ThrottledSms {
    async fn send(&self, to: &str, body: &str) -> Result<SendReceipt> {
        self.throttle(to).await;
        self.inner.send(to, body).await
    }
}
