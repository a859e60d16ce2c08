//! Cooperative task scheduler for interval, daily and one-shot background work
//!
//! Every task runs in its own tokio task with its own [`CancellationToken`].
//! The scheduler keeps a table of live tasks keyed by id so single tasks can
//! be cancelled and inspected; `stop` cancels everything and waits for each
//! task to finish before returning.

pub mod task;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local};
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::errors::{BotError, SchedulerError};
use crate::domain::traits::ErrorReporter;

pub use task::{next_daily_run, task_fn, validate_daily, TaskFn, TaskInfo, TaskKind, TaskStatus};

/// Pause after a failed daily run before the next occurrence is computed
pub const DAILY_FAILURE_BACKOFF: Duration = Duration::from_secs(60);

/// Wall clock used to place daily runs
pub type Clock = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;

struct TaskEntry {
    kind: TaskKind,
    status: TaskStatus,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct TaskTable {
    tasks: HashMap<String, TaskEntry>,
    /// Caller-chosen ids, reserved for the scheduler's lifetime
    reserved: HashSet<String>,
}

struct SchedulerInner {
    /// Flipped only while `table` is held, so no task slips in past a stop
    running: AtomicBool,
    table: Mutex<TaskTable>,
    counter: AtomicU64,
    reporter: Arc<dyn ErrorReporter>,
    clock: Clock,
}

impl SchedulerInner {
    fn table(&self) -> MutexGuard<'_, TaskTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn now(&self) -> DateTime<Local> {
        (self.clock)()
    }

    /// True if `id` has the generated form and its number was already drawn
    fn was_generated(&self, id: &str) -> bool {
        let mut parts = id.splitn(3, '_');
        let kind = parts.next().unwrap_or_default();
        if !matches!(kind, "interval" | "daily" | "once") {
            return false;
        }
        parts
            .next()
            .and_then(|n| n.parse::<u64>().ok())
            .is_some_and(|n| n >= 1 && n <= self.counter.load(Ordering::SeqCst))
    }
}

enum Firing {
    Completed,
    Failed,
    Cancelled,
}

/// Invoke `func` once, isolating errors and panics.
async fn fire(inner: &SchedulerInner, id: &str, kind: TaskKind, func: &TaskFn, cancel: &CancellationToken) -> Firing {
    let call = AssertUnwindSafe(async { func().await }).catch_unwind();

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Firing::Cancelled,
        outcome = call => outcome,
    };

    let error = match outcome {
        Ok(Ok(())) => return Firing::Completed,
        Ok(Err(e)) => e,
        Err(payload) => BotError::from_panic(payload),
    };
    warn!(task_id = id, %kind, error = %error, "scheduled task failed");
    inner
        .reporter
        .report(&error, &format!("scheduler:{}:{}", kind, id), None);
    Firing::Failed
}

/// Sleep unless cancelled first; returns false on cancellation.
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Task scheduler; cheap to clone, clones share the same task table
#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<SchedulerInner>,
}

impl TaskScheduler {
    pub fn new(reporter: Arc<dyn ErrorReporter>) -> Self {
        Self::with_clock(reporter, Arc::new(Local::now))
    }

    /// Scheduler whose daily tasks read the time from `clock`
    pub fn with_clock(reporter: Arc<dyn ErrorReporter>, clock: Clock) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                running: AtomicBool::new(false),
                table: Mutex::new(TaskTable::default()),
                counter: AtomicU64::new(0),
                reporter,
                clock,
            }),
        }
    }

    /// Mark the scheduler running. Spawns nothing by itself.
    pub fn start(&self) {
        let _table = self.inner.table();
        self.inner.running.store(true, Ordering::SeqCst);
        info!("Scheduler started");
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    /// Run `func` every `interval` until cancelled.
    ///
    /// The first run happens one full interval after scheduling. Errors are
    /// reported and the loop carries on.
    pub fn add_interval_task<F, Fut>(
        &self,
        func: F,
        interval: Duration,
        task_id: Option<&str>,
    ) -> Result<String, SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BotError>> + Send + 'static,
    {
        let func = task_fn(func);
        self.spawn(TaskKind::Interval, task_id, None, move |inner, id, cancel| async move {
            loop {
                if !pause(&cancel, interval).await || !inner.is_running() {
                    break;
                }
                if let Firing::Cancelled = fire(&inner, &id, TaskKind::Interval, &func, &cancel).await {
                    break;
                }
            }
        })
    }

    /// Run `func` every day at `hour:minute` local time.
    ///
    /// A time that already passed today first fires tomorrow. After a failed
    /// run the task waits [`DAILY_FAILURE_BACKOFF`] before recomputing.
    pub fn add_daily_task<F, Fut>(
        &self,
        func: F,
        hour: u32,
        minute: u32,
        task_id: Option<&str>,
    ) -> Result<String, SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BotError>> + Send + 'static,
    {
        let at = validate_daily(hour, minute)?;
        let func = task_fn(func);
        let label = format!("{:02}:{:02}", hour, minute);

        self.spawn(TaskKind::Daily, task_id, Some(label), move |inner, id, cancel| async move {
            loop {
                let now = inner.now();
                let target = next_daily_run(&now, at);
                let delay = (target - now).to_std().unwrap_or(Duration::ZERO);
                debug!(task_id = %id, next_run = %target, "daily task waiting");

                if !pause(&cancel, delay).await || !inner.is_running() {
                    break;
                }
                // Woke early against the wall clock; wait out the remainder
                if inner.now() < target {
                    continue;
                }

                match fire(&inner, &id, TaskKind::Daily, &func, &cancel).await {
                    Firing::Cancelled => break,
                    Firing::Failed => {
                        if !pause(&cancel, DAILY_FAILURE_BACKOFF).await {
                            break;
                        }
                    }
                    Firing::Completed => {}
                }
            }
        })
    }

    /// Run `func` once after `delay`, then drop the task from the table.
    pub fn add_task<F, Fut>(&self, func: F, delay: Duration, task_id: Option<&str>) -> Result<String, SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BotError>> + Send + 'static,
    {
        let func = task_fn(func);
        self.spawn(TaskKind::Once, task_id, None, move |inner, id, cancel| async move {
            if pause(&cancel, delay).await && inner.is_running() {
                fire(&inner, &id, TaskKind::Once, &func, &cancel).await;
            }

            let mut table = inner.table();
            if let Some(mut entry) = table.tasks.remove(&id) {
                entry.status = TaskStatus::Done;
                debug!(task_id = %id, status = ?entry.status, "one-shot task finished");
            }
        })
    }

    fn spawn<B, Fut>(
        &self,
        kind: TaskKind,
        requested: Option<&str>,
        label: Option<String>,
        body: B,
    ) -> Result<String, SchedulerError>
    where
        B: FnOnce(Arc<SchedulerInner>, String, CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        // One guard covers the running check, the id and the insert; a
        // one-shot body that finishes early blocks on it until the entry exists
        let mut table = self.inner.table();
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        let id = match requested {
            Some(id) if table.reserved.contains(id) || self.inner.was_generated(id) => {
                return Err(SchedulerError::DuplicateTask(id.to_string()));
            }
            Some(id) => {
                table.reserved.insert(id.to_string());
                id.to_string()
            }
            None => self.generate_id(&table, kind, label.as_deref()),
        };

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(body(self.inner.clone(), id.clone(), cancel.clone()));
        table.tasks.insert(
            id.clone(),
            TaskEntry {
                kind,
                status: TaskStatus::Active,
                cancel,
                handle,
            },
        );
        drop(table);

        info!(task_id = %id, %kind, "task scheduled");
        Ok(id)
    }

    /// Next `<kind>_<n>[_<label>]` id. The counter never rewinds, so only
    /// caller-reserved ids can collide.
    fn generate_id(&self, table: &TaskTable, kind: TaskKind, label: Option<&str>) -> String {
        loop {
            let n = self.inner.counter.fetch_add(1, Ordering::SeqCst) + 1;
            let id = match label {
                Some(label) => format!("{}_{}_{}", kind, n, label),
                None => format!("{}_{}", kind, n),
            };
            if !table.reserved.contains(&id) {
                return id;
            }
        }
    }

    /// Cancel one task. Returns false if `task_id` is not live.
    pub fn cancel_task(&self, task_id: &str) -> bool {
        let Some(mut entry) = self.inner.table().tasks.remove(task_id) else {
            return false;
        };
        entry.status = TaskStatus::Cancelled;
        entry.cancel.cancel();
        info!(task_id, kind = %entry.kind, status = ?entry.status, "task cancelled");
        true
    }

    /// Cancel every task and wait for all of them to finish.
    /// The scheduler is stopped afterwards; reserved ids stay reserved.
    pub async fn cancel_all_tasks(&self) {
        let entries: Vec<(String, TaskEntry)> = {
            let mut table = self.inner.table();
            self.inner.running.store(false, Ordering::SeqCst);
            table.tasks.drain().collect()
        };
        for (_, entry) in &entries {
            entry.cancel.cancel();
        }

        for (id, entry) in entries {
            if let Err(e) = entry.handle.await {
                if e.is_panic() {
                    warn!(task_id = %id, error = %e, "task panicked during shutdown");
                }
            }
        }
    }

    /// Stop the scheduler, awaiting full cancellation of every task.
    pub async fn stop(&self) {
        let count = self.task_count();
        self.cancel_all_tasks().await;
        info!(cancelled = count, "Scheduler stopped");
    }

    /// Snapshot of live tasks, sorted by id
    pub fn get_tasks(&self) -> Vec<TaskInfo> {
        let table = self.inner.table();
        let mut tasks: Vec<TaskInfo> = table
            .tasks
            .iter()
            .map(|(id, entry)| TaskInfo {
                id: id.clone(),
                kind: entry.kind,
                status: entry.status,
            })
            .collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        tasks
    }

    pub fn task_count(&self) -> usize {
        self.inner.table().tasks.len()
    }
}
