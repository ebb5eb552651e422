//! RecurringScheduler - enqueues recurring tasks when their slot comes up.
//!
//! Every process runs one. Each fire carries the slot key
//! `"{task_type}:{slot_unix}"` as its dedupe key, so however many processes
//! fire the same slot, the store keeps a single task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;

use crate::application::handlers::TaskEnqueuer;
use crate::config::RecurringTask;
use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::jobs::{NewTask, ScheduleSpec};
use crate::ports::EnqueueResult;

const TICK: Duration = Duration::from_secs(1);

struct Entry {
    task: RecurringTask,
    next_slot: Timestamp,
}

pub struct RecurringScheduler {
    enqueuer: TaskEnqueuer,
    entries: tokio::sync::Mutex<Vec<Entry>>,
}

impl RecurringScheduler {
    /// First slots are the ones after `now`; nothing fires retroactively.
    pub fn new(enqueuer: TaskEnqueuer, tasks: Vec<RecurringTask>, now: Timestamp) -> Self {
        let entries = tasks
            .into_iter()
            .map(|task| Entry {
                next_slot: task.schedule.next_after(now),
                task,
            })
            .collect();
        Self {
            enqueuer,
            entries: tokio::sync::Mutex::new(entries),
        }
    }

    /// Enqueues every slot that is due at `now`. Returns how many tasks were
    /// newly stored (duplicates from other processes are not counted).
    pub async fn fire_due(&self, now: Timestamp) -> Result<usize, DomainError> {
        let mut entries = self.entries.lock().await;
        let mut enqueued = 0;
        for entry in entries.iter_mut() {
            if now.is_before(&entry.next_slot) {
                continue;
            }
            let slot = entry.next_slot;
            let task_type = entry.task.task_type;
            let new = NewTask::new(task_type, serde_json::Value::Null)
                .queue(entry.task.queue)
                .run_at(slot)
                .dedupe_key(ScheduleSpec::slot_key(task_type, slot));
            match self.enqueuer.enqueue(new, now).await? {
                EnqueueResult::Enqueued(id) => {
                    tracing::debug!(
                        task.id = %id,
                        task.task_type = %task_type,
                        slot = slot.as_unix_secs(),
                        "Recurring task fired"
                    );
                    enqueued += 1;
                }
                EnqueueResult::Duplicate => {}
            }
            // Missed slots collapse into one fire.
            entry.next_slot = entry.task.schedule.next_after(now);
        }
        Ok(enqueued)
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        {
            let entries = self.entries.lock().await;
            for entry in entries.iter() {
                tracing::info!(
                    task.task_type = %entry.task.task_type,
                    schedule = %entry.task.schedule,
                    "Recurring task registered"
                );
            }
        }
        let mut interval = time::interval(TICK);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = self.fire_due(Timestamp::now()).await {
                        tracing::error!(error = %e, "Failed to fire recurring tasks");
                    }
                }
            }
        }
    }
}
