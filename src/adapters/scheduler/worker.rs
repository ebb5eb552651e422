//! WorkerPool - claims tasks in weighted class order and runs them.
//!
//! Each claim leases the task for the task timeout. A handler that outlives
//! the timeout is abandoned and its attempt counted as a `Timeout`. A handler
//! panic counts as a recoverable failure of that attempt; a worker that dies
//! mid-task leaves the lease to the reaper.
//!
//! ## Graceful Shutdown
//!
//! On shutdown the pool stops claiming, waits up to the drain timeout for
//! running tasks, then aborts the rest. Aborted tasks keep their lease and
//! come back through the reaper.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::jobs::{decide, QueueWeights, RetryDecision, Task, TaskError, WeightedSelector};
use crate::ports::TaskStore;

use super::HandlerRegistry;

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub workers: usize,
    pub poll_interval: Duration,
    /// Per-attempt limit; also the lease length.
    pub task_timeout: Duration,
    pub weights: QueueWeights,
    pub drain_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval: Duration::from_millis(500),
            task_timeout: Duration::from_secs(60),
            weights: QueueWeights::default(),
            drain_timeout: Duration::from_secs(30),
        }
    }
}

/// What happened to one executed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Retried { run_at: Timestamp },
    Failed { error: String },
}

pub struct WorkerPool {
    inner: Arc<Runner>,
    selector: Mutex<WeightedSelector>,
    config: WorkerPoolConfig,
}

/// The part shared with spawned executions.
struct Runner {
    store: Arc<dyn TaskStore>,
    registry: HandlerRegistry,
    task_timeout: Duration,
}

impl WorkerPool {
    pub fn new(
        store: Arc<dyn TaskStore>,
        registry: HandlerRegistry,
        config: WorkerPoolConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Runner {
                store,
                registry,
                task_timeout: config.task_timeout,
            }),
            selector: Mutex::new(WeightedSelector::new(config.weights)),
            config,
        }
    }

    /// Claims the next task, trying classes in weighted order.
    pub async fn claim(&self, now: Timestamp) -> Result<Option<Task>, DomainError> {
        let order = match self.selector.lock() {
            Ok(mut selector) => selector.claim_order(),
            Err(poisoned) => poisoned.into_inner().claim_order(),
        };
        for class in order {
            if let Some(task) = self
                .inner
                .store
                .claim_next(class, now, self.config.task_timeout)
                .await?
            {
                return Ok(Some(task));
            }
        }
        Ok(None)
    }

    /// Claims and runs one task inline. `None` when nothing is ready.
    pub async fn run_once(
        &self,
        now: Timestamp,
    ) -> Result<Option<(Task, TaskOutcome)>, DomainError> {
        match self.claim(now).await? {
            Some(task) => {
                let outcome = self.inner.execute(&task).await;
                Ok(Some((task, outcome)))
            }
            None => Ok(None),
        }
    }

    /// Polls until `shutdown` flips to true, then drains.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            workers = self.config.workers,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Worker pool started"
        );
        let permits = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut running = JoinSet::new();
        let mut interval = time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.dispatch_ready(&permits, &mut running).await;
                }
                Some(joined) = running.join_next(), if !running.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Task execution panicked");
                    }
                }
            }
        }

        self.drain(running).await;
        tracing::info!("Worker pool stopped");
    }

    /// Fills free worker slots with ready tasks.
    async fn dispatch_ready(&self, permits: &Arc<Semaphore>, running: &mut JoinSet<()>) {
        loop {
            let Ok(permit) = permits.clone().try_acquire_owned() else {
                tracing::trace!("All workers busy");
                return;
            };
            match self.claim(Timestamp::now()).await {
                Ok(Some(task)) => {
                    let runner = self.inner.clone();
                    running.spawn(async move {
                        let _permit = permit;
                        runner.execute(&task).await;
                    });
                }
                Ok(None) => return,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim task");
                    return;
                }
            }
        }
    }

    async fn drain(&self, mut running: JoinSet<()>) {
        if running.is_empty() {
            return;
        }
        tracing::info!(in_flight = running.len(), "Draining running tasks");
        let drained = time::timeout(self.config.drain_timeout, async {
            while running.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                abandoned = running.len(),
                "Drain timeout reached, aborting remaining tasks"
            );
            running.abort_all();
        }
    }
}

impl Runner {
    #[tracing::instrument(
        skip(self, task),
        fields(task.id = %task.id, task.task_type = %task.task_type, task.attempt = task.attempts)
    )]
    async fn execute(&self, task: &Task) -> TaskOutcome {
        let result = match self.registry.get(task.task_type) {
            Some(handler) => {
                let guarded = AssertUnwindSafe(handler.handle(task)).catch_unwind();
                match time::timeout(self.task_timeout, guarded).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(panic)) => Err(TaskError::recoverable(format!(
                        "handler panicked: {}",
                        panic_message(panic.as_ref())
                    ))),
                    Err(_) => Err(TaskError::Timeout(self.task_timeout.as_secs())),
                }
            }
            None => Err(TaskError::unrecoverable(format!(
                "no handler registered for {}",
                task.task_type
            ))),
        };
        let now = Timestamp::now();

        match result {
            Ok(()) => {
                if let Err(e) = self.store.complete(&task.id, now).await {
                    tracing::error!(error = %e, "Failed to mark task completed");
                }
                tracing::debug!("Task completed");
                TaskOutcome::Completed
            }
            Err(error) => self.settle_failure(task, &error, now).await,
        }
    }

    async fn settle_failure(&self, task: &Task, error: &TaskError, now: Timestamp) -> TaskOutcome {
        let message = error.to_string();
        match decide(task, error, now) {
            RetryDecision::Retry {
                run_at,
                backoff_secs,
            } => {
                tracing::warn!(
                    error = %message,
                    backoff_secs,
                    max_attempts = task.max_attempts,
                    "Task failed, retrying"
                );
                if let Err(e) = self.store.retry(&task.id, run_at, &message).await {
                    tracing::error!(error = %e, "Failed to reschedule task");
                }
                TaskOutcome::Retried { run_at }
            }
            RetryDecision::Fail => {
                tracing::error!(
                    error = %message,
                    recoverable = error.is_recoverable(),
                    "Task failed permanently"
                );
                if let Err(e) = self.store.fail(&task.id, &message, now).await {
                    tracing::error!(error = %e, "Failed to mark task failed");
                }
                TaskOutcome::Failed { error: message }
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("registry", &self.inner.registry)
            .finish_non_exhaustive()
    }
}
