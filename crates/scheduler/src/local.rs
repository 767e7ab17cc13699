//! In-process task scheduler
//!
//! Jobs are spawned on the tokio runtime, optionally after a delay, and run
//! on the blocking pool. Their state lives in a task table keyed by task id;
//! finished entries are swept once they are older than the configured result
//! TTL, after which they poll as unknown. Periodic loops resubmit a job on a
//! fixed interval and stop on [`LocalScheduler::shutdown`].

use robofleet_core::FleetConfig;
use robofleet_orchestrator::{Job, SubmitError, TaskHandle, TaskSubmitter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Result, SchedulerError};
use crate::job;

/// Lifecycle of a submitted task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for its delay to elapse
    Pending,
    Running,
    Success { result: Value },
    Failure { error: String },
    /// No task with this id was submitted here
    Unknown,
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Success { .. } | TaskStatus::Failure { .. })
    }
}

struct TaskEntry {
    status: TaskStatus,
    finished_at: Option<Instant>,
}

/// Tokio-backed implementation of [`TaskSubmitter`]
#[derive(Clone)]
pub struct LocalScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    config: FleetConfig,
    runtime: Handle,
    tasks: Mutex<HashMap<Uuid, TaskEntry>>,
    periodic: Mutex<Vec<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl LocalScheduler {
    /// Create a scheduler on the current tokio runtime
    pub fn new(config: FleetConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| SchedulerError::NoRuntime(e.to_string()))?;
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                runtime,
                tasks: Mutex::new(HashMap::new()),
                periodic: Mutex::new(Vec::new()),
                shutdown,
            }),
        })
    }

    pub fn config(&self) -> &FleetConfig {
        &self.inner.config
    }

    /// Current state of a submitted task
    pub fn poll(&self, handle: &TaskHandle) -> TaskStatus {
        self.tasks()
            .get(&handle.task_id)
            .map(|entry| entry.status.clone())
            .unwrap_or(TaskStatus::Unknown)
    }

    /// Drop finished tasks older than the result TTL; returns how many went
    pub fn purge_expired(&self) -> usize {
        let ttl = self.inner.config.scheduler.result_ttl();
        let now = Instant::now();
        let mut tasks = self.tasks();
        let before = tasks.len();
        tasks.retain(|_, entry| match entry.finished_at {
            Some(finished) => now.duration_since(finished) < ttl,
            None => true,
        });
        let purged = before - tasks.len();
        if purged > 0 {
            debug!(purged, remaining = tasks.len(), "Expired task results purged");
        }
        purged
    }

    /// Poll until the task finishes or `timeout` elapses
    pub async fn wait(&self, handle: &TaskHandle, timeout: Duration) -> TaskStatus {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let status = self.poll(handle);
            if status.is_finished()
                || status == TaskStatus::Unknown
                || tokio::time::Instant::now() >= deadline
            {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Submit `job` every `interval`, starting now; missed ticks are skipped
    pub fn spawn_periodic(&self, job: Job, interval: Duration) {
        let scheduler = self.clone();
        let mut shutdown = self.inner.shutdown.subscribe();

        info!(job = %job, interval_secs = interval.as_secs(), "Periodic job registered");

        let handle = self.inner.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = scheduler.submit(job.clone(), Duration::ZERO) {
                            warn!(job = %job, error = %err, "Periodic submission rejected");
                            break;
                        }
                    }
                    _ = shutdown.wait_for(|stopped| *stopped) => break,
                }
            }
            debug!(job = %job, "Periodic job stopped");
        });

        self.periodic().push(handle);
    }

    /// Stop periodic loops and refuse new submissions.
    ///
    /// Jobs already running finish; delayed jobs not yet started are dropped.
    pub async fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);

        let handles: Vec<_> = self.periodic().drain(..).collect();
        for handle in handles {
            if let Err(err) = handle.await {
                error!(error = %err, "Periodic loop ended abnormally");
            }
        }
        info!("Scheduler stopped");
    }

    pub fn is_shut_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<Uuid, TaskEntry>> {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn periodic(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.inner
            .periodic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, task_id: Uuid, status: TaskStatus) {
        let finished_at = status.is_finished().then(Instant::now);
        self.tasks().insert(
            task_id,
            TaskEntry {
                status,
                finished_at,
            },
        );
    }

    async fn run(self, handle: TaskHandle, job: Job, delay: Duration) {
        if !delay.is_zero() {
            let mut shutdown = self.inner.shutdown.subscribe();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.wait_for(|stopped| *stopped) => {
                    self.set_status(
                        handle.task_id,
                        TaskStatus::Failure { error: "scheduler shut down before start".to_string() },
                    );
                    return;
                }
            }
        }

        self.set_status(handle.task_id, TaskStatus::Running);
        debug!(task_id = %handle.task_id, job = %job, "Task started");

        let worker = self.clone();
        let result = tokio::task::spawn_blocking(move || {
            job::execute(&job, &worker.inner.config, &worker)
        })
        .await
        .map_err(|e| SchedulerError::Worker(e.to_string()))
        .and_then(|r| r);

        let status = match result {
            Ok(result) => {
                debug!(task_id = %handle.task_id, job = %handle.job, "Task succeeded");
                TaskStatus::Success { result }
            }
            Err(err) => {
                warn!(task_id = %handle.task_id, job = %handle.job, error = %err, "Task failed");
                TaskStatus::Failure {
                    error: err.to_string(),
                }
            }
        };
        self.set_status(handle.task_id, status);
    }
}

impl TaskSubmitter for LocalScheduler {
    fn submit(&self, job: Job, delay: Duration) -> std::result::Result<TaskHandle, SubmitError> {
        if self.is_shut_down() {
            return Err(SubmitError("scheduler is shut down".to_string()));
        }

        self.purge_expired();

        let handle = TaskHandle::new(&job);
        self.set_status(handle.task_id, TaskStatus::Pending);
        debug!(task_id = %handle.task_id, job = %job, delay = ?delay, "Task submitted");

        self.inner
            .runtime
            .spawn(self.clone().run(handle.clone(), job, delay));
        Ok(handle)
    }
}
