use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Condvar, Mutex},
    time::Duration,
};

use crate::{
    config::SdkConfig,
    storage::Storages,
    sync::{
        fetcher::{SegmentFetcher, SplitFetcher},
        flush,
        recorder::{ImpressionRecorder, MetricsRecorder},
        segments::SegmentSynchronizer,
        splits::SplitSynchronizer,
        task::{PeriodicTask, TaskTrigger},
        workers::WorkerPool,
    },
    Error, Result, SdkMetadata,
};

/// One of the background tasks run by [`SyncManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum TaskKind {
    Splits,
    Segments,
    Impressions,
    Gauges,
    Counters,
    Latencies,
}

impl TaskKind {
    /// Every task, in start order.
    pub const ALL: [TaskKind; 6] = [
        TaskKind::Splits,
        TaskKind::Segments,
        TaskKind::Impressions,
        TaskKind::Gauges,
        TaskKind::Counters,
        TaskKind::Latencies,
    ];

    fn name(self) -> &'static str {
        match self {
            TaskKind::Splits => "splits",
            TaskKind::Segments => "segments",
            TaskKind::Impressions => "impressions",
            TaskKind::Gauges => "gauges",
            TaskKind::Counters => "counters",
            TaskKind::Latencies => "latencies",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Control-plane collaborators used by the background tasks.
#[derive(Clone)]
#[allow(missing_docs)]
pub struct SyncServices {
    pub split_fetcher: Arc<dyn SplitFetcher>,
    pub segment_fetcher: Arc<dyn SegmentFetcher>,
    pub impression_recorder: Arc<dyn ImpressionRecorder>,
    pub metrics_recorder: Arc<dyn MetricsRecorder>,
}

#[derive(Default)]
struct ReadyState {
    splits: bool,
    segments: bool,
    error: Option<Error>,
}

/// Set once splits and segments have each been synchronized, or an unrecoverable error occurred.
#[derive(Default)]
struct Readiness {
    state: Mutex<ReadyState>,
    changed: Condvar,
}

impl Readiness {
    fn update(&self, f: impl FnOnce(&mut ReadyState)) {
        let mut state = self
            .state
            .lock()
            .expect("thread holding readiness lock should not panic");
        f(&mut state);
        self.changed.notify_all();
    }

    fn splits_ready(&self) -> bool {
        self.state
            .lock()
            .expect("thread holding readiness lock should not panic")
            .splits
    }

    /// Record the outcome of a split sync. Returns `true` the first time splits become ready.
    fn splits_synced(&self, result: &Result<()>) -> bool {
        let mut first = false;
        self.update(|state| match result {
            Ok(()) => {
                first = !state.splits;
                state.splits = true;
            }
            Err(Error::Unauthorized) => state.error = Some(Error::Unauthorized),
            Err(_) => {}
        });
        first
    }

    fn segments_synced(&self, result: &Result<()>, splits_were_ready: bool) {
        self.update(|state| match result {
            Ok(()) if splits_were_ready => state.segments = true,
            Err(Error::Unauthorized) => state.error = Some(Error::Unauthorized),
            _ => {}
        });
    }

    fn wait(&self, timeout: Duration) -> Result<()> {
        let state = self.state.lock().map_err(|_| Error::TaskPanicked)?;
        let (state, _) = self
            .changed
            .wait_timeout_while(state, timeout, |state| {
                state.error.is_none() && !(state.splits && state.segments)
            })
            .map_err(|_| Error::TaskPanicked)?;
        match &state.error {
            Some(err) => Err(err.clone()),
            None if state.splits && state.segments => Ok(()),
            None => Err(Error::ReadyTimeout),
        }
    }
}

struct Shared {
    storages: Storages,
    services: SyncServices,
    metadata: SdkMetadata,
    config: SdkConfig,
    pool: Arc<WorkerPool>,
    readiness: Readiness,
    /// Trigger of the running segments task, used to refresh segments as soon as splits arrive.
    segments_trigger: Mutex<Option<TaskTrigger>>,
}

impl Shared {
    fn period(&self, kind: TaskKind) -> Duration {
        let periods = &self.config.task_periods;
        match kind {
            TaskKind::Splits => periods.splits,
            TaskKind::Segments => periods.segments,
            TaskKind::Impressions => periods.impressions,
            TaskKind::Gauges => periods.gauges,
            TaskKind::Counters => periods.counters,
            TaskKind::Latencies => periods.latencies,
        }
    }

    fn run(
        &self,
        kind: TaskKind,
        splits: &SplitSynchronizer,
        segments: &SegmentSynchronizer,
    ) -> Result<()> {
        let storages = &self.storages;
        match kind {
            TaskKind::Splits => {
                let result = splits.synchronize();
                if self.readiness.splits_synced(&result) {
                    if let Some(trigger) = &*self
                        .segments_trigger
                        .lock()
                        .expect("thread holding trigger lock should not panic")
                    {
                        trigger.run_now();
                    }
                }
                result
            }
            TaskKind::Segments => {
                let splits_were_ready = self.readiness.splits_ready();
                let result = segments.synchronize();
                self.readiness.segments_synced(&result, splits_were_ready);
                result
            }
            TaskKind::Impressions => flush::flush_impressions(
                storages.impressions.as_ref(),
                self.services.impression_recorder.as_ref(),
                &self.metadata,
                self.config.advanced.impressions_bulk_size,
            ),
            TaskKind::Gauges => flush::flush_gauges(
                storages.metrics.as_ref(),
                self.services.metrics_recorder.as_ref(),
                &self.metadata,
            ),
            TaskKind::Counters => flush::flush_counters(
                storages.metrics.as_ref(),
                self.services.metrics_recorder.as_ref(),
                &self.metadata,
            ),
            TaskKind::Latencies => flush::flush_latencies(
                storages.metrics.as_ref(),
                self.services.metrics_recorder.as_ref(),
                &self.metadata,
            ),
        }
    }
}

/// Supervisor of the six background tasks.
///
/// Each task runs on its own thread and can be started and stopped independently. Stopping a task
/// waits for its in-flight iteration, so storage never sees a half-applied change-set.
pub struct SyncManager {
    shared: Arc<Shared>,
    tasks: Mutex<HashMap<TaskKind, PeriodicTask>>,
}

impl SyncManager {
    /// Create a manager. No task is started.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the segment worker threads cannot be spawned.
    pub fn new(
        storages: Storages,
        services: SyncServices,
        metadata: SdkMetadata,
        config: SdkConfig,
    ) -> Result<SyncManager> {
        let pool = WorkerPool::new(
            "splitio-segments",
            config.advanced.segment_workers,
            config.advanced.segment_queue_size,
        )?;
        Ok(SyncManager {
            shared: Arc::new(Shared {
                storages,
                services,
                metadata,
                config,
                pool: Arc::new(pool),
                readiness: Readiness::default(),
                segments_trigger: Mutex::new(None),
            }),
            tasks: Mutex::new(HashMap::new()),
        })
    }

    fn tasks(&self) -> std::sync::MutexGuard<'_, HashMap<TaskKind, PeriodicTask>> {
        self.tasks
            .lock()
            .expect("thread holding tasks lock should not panic")
    }

    /// Start every task that is not running.
    pub fn start_all(&self) -> Result<()> {
        TaskKind::ALL.into_iter().try_for_each(|kind| self.start(kind))
    }

    /// Start task `kind`. Does nothing if it is already running.
    pub fn start(&self, kind: TaskKind) -> Result<()> {
        let mut tasks = self.tasks();
        if tasks.get(&kind).is_some_and(PeriodicTask::is_running) {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let splits = SplitSynchronizer::new(
            Arc::clone(&shared.services.split_fetcher),
            Arc::clone(&shared.storages.splits),
        );
        let segments = SegmentSynchronizer::new(
            Arc::clone(&shared.services.segment_fetcher),
            Arc::clone(&shared.storages.splits),
            Arc::clone(&shared.storages.segments),
            Arc::clone(&shared.pool),
        );
        let task = PeriodicTask::start(
            kind.name(),
            shared.period(kind),
            shared.config.task_periods.jitter,
            {
                let shared = Arc::clone(&shared);
                move || shared.run(kind, &splits, &segments)
            },
        )?;

        if kind == TaskKind::Segments {
            let trigger = task.trigger();
            // Splits may have become ready before the trigger was published.
            if shared.readiness.splits_ready() {
                trigger.run_now();
            }
            *shared
                .segments_trigger
                .lock()
                .expect("thread holding trigger lock should not panic") = Some(trigger);
        }
        log::debug!(target: "splitio", task = task.name(); "task started");
        // A finished task left in the map is replaced; its thread has already exited.
        tasks.insert(kind, task);
        Ok(())
    }

    /// Stop task `kind` and wait for its in-flight iteration to finish.
    pub fn stop(&self, kind: TaskKind) -> Result<()> {
        // Join outside the lock so other tasks can be controlled meanwhile.
        let task = self.tasks().remove(&kind);
        match task {
            Some(task) => task.shutdown(),
            None => Ok(()),
        }
    }

    /// Queue one extra run of task `kind`, if it is running.
    pub fn run_now(&self, kind: TaskKind) {
        if let Some(task) = self.tasks().get(&kind) {
            if task.is_busy() {
                log::debug!(target: "splitio", task = kind.name(); "iteration in flight, run queued after it");
            }
            task.trigger().run_now();
        }
    }

    /// Whether task `kind` is running.
    pub fn is_running(&self, kind: TaskKind) -> bool {
        self.tasks().get(&kind).is_some_and(PeriodicTask::is_running)
    }

    /// Block until splits and segments have each been synchronized once.
    ///
    /// # Errors
    ///
    /// - [`Error::Unauthorized`] if the control plane rejected the api key.
    /// - [`Error::ReadyTimeout`] if `timeout` elapsed first.
    pub fn wait_until_ready(&self, timeout: Duration) -> Result<()> {
        self.shared.readiness.wait(timeout)
    }

    /// Stop every task, flush the remaining telemetry once and stop the segment workers.
    pub fn shutdown(&self) -> Result<()> {
        let tasks: Vec<_> = self.tasks().drain().collect();
        for (_, task) in &tasks {
            task.stop();
        }
        let mut result = Ok(());
        for (kind, task) in tasks {
            if let Err(err) = task.shutdown() {
                log::error!(target: "splitio", task = kind.name(); "task failed to shut down: {err}");
                result = Err(err);
            }
        }

        let shared = &self.shared;
        let flushed = flush::flush_impressions(
            shared.storages.impressions.as_ref(),
            shared.services.impression_recorder.as_ref(),
            &shared.metadata,
            shared.config.advanced.impressions_bulk_size,
        )
        .and_then(|()| {
            flush::flush_gauges(
                shared.storages.metrics.as_ref(),
                shared.services.metrics_recorder.as_ref(),
                &shared.metadata,
            )
        })
        .and_then(|()| {
            flush::flush_counters(
                shared.storages.metrics.as_ref(),
                shared.services.metrics_recorder.as_ref(),
                &shared.metadata,
            )
        })
        .and_then(|()| {
            flush::flush_latencies(
                shared.storages.metrics.as_ref(),
                shared.services.metrics_recorder.as_ref(),
                &shared.metadata,
            )
        });
        if let Err(err) = flushed {
            log::warn!(target: "splitio", "final telemetry flush failed: {err}");
        }

        shared.pool.shutdown()?;
        result
    }
}

impl Drop for SyncManager {
    fn drop(&mut self) {
        // Task closures keep the shared state alive, so threads must be told to exit explicitly.
        if let Ok(tasks) = self.tasks.lock() {
            for task in tasks.values() {
                task.stop();
            }
        }
    }
}
