//! Day-before reminder scheduling.
//!
//! Each order gets at most one in-memory, one-shot reminder task. Registrations are
//! not persisted; the bootstrapper recreates them from storage on startup.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};

use crate::{
    datetime,
    domain::{Order, OrderId, Provider, ProviderId},
    messaging::port::SmsPort,
    notify, Result,
};

/// Hours before delivery the reminder goes out.
pub const REMINDER_LEAD_HOURS: i64 = 24;

/// Outcome of planning a reminder for one order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReminderPlan {
    /// The provider has no reminder time configured.
    NoReminderTime,
    /// The computed fire time has already passed; nothing is registered.
    InPast { fire_at: DateTime<Utc> },
    At { fire_at: DateTime<Utc> },
}

/// Result of a `schedule*` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheduled {
    Registered { fire_at: DateTime<Utc> },
    Skipped(ReminderPlan),
}

/// Reminder fire time: the provider's reminder time on the delivery date, minus one day.
pub fn fire_time(order: &Order, provider: &Provider) -> Result<Option<DateTime<Utc>>> {
    let Some(time) = provider.reminder_time.as_deref() else {
        return Ok(None);
    };
    let at = datetime::resolve(&order.delivery_date, time)?;
    Ok(Some(at - chrono::Duration::hours(REMINDER_LEAD_HOURS)))
}

/// Plan a reminder relative to `now`. Pure; used by tests and the bootstrapper.
pub fn plan_at(order: &Order, provider: &Provider, now: DateTime<Utc>) -> Result<ReminderPlan> {
    Ok(match fire_time(order, provider)? {
        None => ReminderPlan::NoReminderTime,
        Some(fire_at) if fire_at <= now => ReminderPlan::InPast { fire_at },
        Some(fire_at) => ReminderPlan::At { fire_at },
    })
}

#[derive(Clone)]
pub struct ReminderScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    sms: Arc<dyn SmsPort>,
    tracker: TaskTracker,
    jobs: tokio::sync::Mutex<HashMap<JobKey, JobEntry>>,
    next_trial: AtomicU64,
}

/// Registrations are keyed apart so a trial never replaces an order's real reminder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum JobKey {
    Order(OrderId),
    Trial(u64),
}

struct JobEntry {
    order_id: OrderId,
    provider_id: ProviderId,
    fire_at: DateTime<Utc>,
    /// Distinguishes a replacement registration from the one it replaced.
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// A registered, not yet fired reminder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingReminder {
    pub order_id: OrderId,
    pub fire_at: DateTime<Utc>,
    /// Registered by a trial trigger rather than for the order's delivery.
    pub trial: bool,
}

impl ReminderScheduler {
    pub fn new(sms: Arc<dyn SmsPort>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                sms,
                tracker: TaskTracker::new(),
                jobs: tokio::sync::Mutex::new(HashMap::new()),
                next_trial: AtomicU64::new(1),
            }),
        }
    }

    /// Schedule the day-before reminder for an order.
    ///
    /// `provider.slots` must already be loaded; the reminder lists them as they are
    /// now. A malformed delivery date or reminder time is returned as an error and
    /// nothing is registered.
    pub async fn schedule(&self, order: &Order, provider: &Provider) -> Result<Scheduled> {
        match plan_at(order, provider, Utc::now())? {
            ReminderPlan::At { fire_at } => Ok(self
                .register(JobKey::Order(order.id), order, provider, fire_at)
                .await),
            skipped => {
                debug!(order_id = %order.id, plan = ?skipped, "reminder not scheduled");
                Ok(Scheduled::Skipped(skipped))
            }
        }
    }

    /// Register an order's reminder at an explicit time, replacing any pending one.
    pub async fn schedule_at(
        &self,
        order: &Order,
        provider: &Provider,
        fire_at: DateTime<Utc>,
    ) -> Scheduled {
        if fire_at <= Utc::now() {
            return Scheduled::Skipped(ReminderPlan::InPast { fire_at });
        }
        self.register(JobKey::Order(order.id), order, provider, fire_at)
            .await
    }

    /// Register a one-off trial reminder.
    ///
    /// Trials are independent of each other and of the order's own reminder, which
    /// stays pending. Only `cancel_provider` and `shutdown` reach them.
    pub async fn schedule_trial(
        &self,
        order: &Order,
        provider: &Provider,
        fire_at: DateTime<Utc>,
    ) -> Scheduled {
        if fire_at <= Utc::now() {
            return Scheduled::Skipped(ReminderPlan::InPast { fire_at });
        }
        let key = JobKey::Trial(self.inner.next_trial.fetch_add(1, Ordering::Relaxed));
        self.register(key, order, provider, fire_at).await
    }

    async fn register(
        &self,
        key: JobKey,
        order: &Order,
        provider: &Provider,
        fire_at: DateTime<Utc>,
    ) -> Scheduled {
        let cancel = CancellationToken::new();
        let generation = next_generation();
        let delay = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        let scheduler = self.clone();
        let order_snapshot = order.clone();
        let provider_snapshot = provider.clone();
        let cancel_clone = cancel.clone();

        // Hold the map lock across spawn so a fast-firing task cannot look itself up
        // before it has been inserted.
        let mut jobs = self.inner.jobs.lock().await;
        let handle = self.inner.tracker.spawn(async move {
            tokio::select! {
              _ = cancel_clone.cancelled() => {
                debug!(order_id = %order_snapshot.id, "reminder cancelled");
              }
              _ = sleep(delay) => {
                scheduler.fire(&order_snapshot, &provider_snapshot).await;
                scheduler.forget(key, generation).await;
              }
            }
        });

        let previous = jobs.insert(
            key,
            JobEntry {
                order_id: order.id,
                provider_id: provider.id,
                fire_at,
                generation,
                cancel,
                handle,
            },
        );
        drop(jobs);

        if let Some(prev) = previous {
            prev.cancel.cancel();
            debug!(order_id = %order.id, previous = %prev.fire_at, "replaced pending reminder");
        }

        info!(order_id = %order.id, %fire_at, trial = matches!(key, JobKey::Trial(_)), "reminder scheduled");
        Scheduled::Registered { fire_at }
    }

    async fn fire(&self, order: &Order, provider: &Provider) {
        let delivery_date = match datetime::parse_date(&order.delivery_date) {
            Ok(d) => d,
            Err(e) => {
                warn!(order_id = %order.id, "reminder dropped: {e}");
                return;
            }
        };

        let body = notify::reminder_message(provider, order, delivery_date);
        match self.inner.sms.send(&order.contact_number, &body).await {
            Ok(receipt) => {
                info!(order_id = %order.id, sid = ?receipt.sid, "reminder sent");
            }
            Err(e) => {
                warn!(order_id = %order.id, to = %order.contact_number, "reminder send failed: {e}");
            }
        }
    }

    async fn forget(&self, key: JobKey, generation: u64) {
        let mut jobs = self.inner.jobs.lock().await;
        if jobs
            .get(&key)
            .map(|j| j.generation == generation)
            .unwrap_or(false)
        {
            jobs.remove(&key);
        }
    }

    /// Cancel an order's pending reminder. Returns whether one was pending.
    ///
    /// Trials for the order are left alone. Best-effort: a reminder that is already
    /// sending will still go out.
    pub async fn cancel(&self, order_id: OrderId) -> bool {
        let entry = self.inner.jobs.lock().await.remove(&JobKey::Order(order_id));
        match entry {
            Some(job) => {
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending reminder of a provider's orders, trials included.
    pub async fn cancel_provider(&self, provider_id: ProviderId) -> usize {
        let mut jobs = self.inner.jobs.lock().await;
        let keys: Vec<JobKey> = jobs
            .iter()
            .filter(|(_, j)| j.provider_id == provider_id)
            .map(|(key, _)| *key)
            .collect();
        for key in &keys {
            if let Some(job) = jobs.remove(key) {
                job.cancel.cancel();
            }
        }
        keys.len()
    }

    /// Pending reminders ordered by fire time.
    pub async fn pending(&self) -> Vec<PendingReminder> {
        let jobs = self.inner.jobs.lock().await;
        let mut out: Vec<PendingReminder> = jobs
            .iter()
            .filter(|(_, j)| !j.handle.is_finished())
            .map(|(key, j)| PendingReminder {
                order_id: j.order_id,
                fire_at: j.fire_at,
                trial: matches!(key, JobKey::Trial(_)),
            })
            .collect();
        out.sort_by_key(|p| (p.fire_at, p.order_id, p.trial));
        out
    }

    /// Wait until every spawned reminder task has finished (fired or cancelled).
    pub async fn wait_idle(&self) {
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        self.inner.tracker.reopen();
    }

    /// Cancel everything and wait for the tasks to exit.
    pub async fn shutdown(&self) {
        let drained: Vec<JobEntry> = {
            let mut jobs = self.inner.jobs.lock().await;
            jobs.drain().map(|(_, j)| j).collect()
        };
        let count = drained.len();
        for job in drained {
            job.cancel.cancel();
        }
        self.wait_idle().await;
        info!(cancelled = count, "reminder scheduler stopped");
    }
}

fn next_generation() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}
