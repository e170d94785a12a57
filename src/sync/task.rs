//! A background thread that runs a job periodically.
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{RecvTimeoutError, SyncSender, TrySendError},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use rand::{thread_rng, Rng};

use crate::{Error, Result};

enum Command {
    RunNow,
    Stop,
}

/// Handle used to request an extra run of a [`PeriodicTask`] from another thread.
#[derive(Clone)]
pub(crate) struct TaskTrigger {
    sender: SyncSender<Command>,
}

impl TaskTrigger {
    /// Queue one extra run. Requests made while one is already queued are merged.
    pub fn run_now(&self) {
        // Full means a run or a stop is already queued. Disconnected means the task has exited.
        let _ = self.sender.try_send(Command::RunNow);
    }
}

/// A job executed on its own thread every `period`.
///
/// The job runs once immediately after start. A single thread executes every iteration, so two
/// iterations of the same task never overlap: ticks that elapse while an iteration is in progress
/// are folded into the next wait.
pub(crate) struct PeriodicTask {
    name: String,
    join_handle: JoinHandle<()>,
    /// Used to send stop and run-now commands to the thread.
    commands: SyncSender<Command>,
    /// Set once stop was requested. A queued run-now may occupy the command slot, so the thread
    /// checks this flag before every iteration.
    stopped: Arc<AtomicBool>,
    busy: Arc<AtomicBool>,
}

impl PeriodicTask {
    /// Spawn a thread named `name` running `job` every `period` minus a random `jitter`.
    ///
    /// Errors returned by `job` are logged and the task continues at the next tick, except for
    /// [`Error::Unauthorized`] which stops the task. Panics are caught and logged.
    pub fn start<F>(
        name: &str,
        period: Duration,
        jitter: Duration,
        mut job: F,
    ) -> std::io::Result<PeriodicTask>
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        // Buffer size of 1: a pending run-now is enough, extra requests can be dropped.
        let (commands, receiver) = std::sync::mpsc::sync_channel::<Command>(1);
        let stopped = Arc::new(AtomicBool::new(false));
        let busy = Arc::new(AtomicBool::new(false));

        let join_handle = {
            let name = name.to_owned();
            let stopped = Arc::clone(&stopped);
            let busy = Arc::clone(&busy);
            std::thread::Builder::new()
                .name(format!("splitio-{name}"))
                .spawn(move || loop {
                    if stopped.load(Ordering::SeqCst) {
                        return;
                    }

                    busy.store(true, Ordering::SeqCst);
                    let result = catch_unwind(AssertUnwindSafe(&mut job));
                    busy.store(false, Ordering::SeqCst);

                    match result {
                        Ok(Ok(())) => {}
                        Ok(Err(Error::Unauthorized)) => {
                            log::error!(target: "splitio", task = name.as_str(); "unauthorized, stopping task");
                            return;
                        }
                        Ok(Err(err)) => {
                            log::warn!(target: "splitio", task = name.as_str(); "task iteration failed: {err}");
                        }
                        Err(_) => {
                            log::error!(target: "splitio", task = name.as_str(); "task iteration panicked");
                        }
                    }

                    match receiver.recv_timeout(jittered(period, jitter)) {
                        Err(RecvTimeoutError::Timeout) | Ok(Command::RunNow) => {}
                        Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => {
                            log::debug!(target: "splitio", task = name.as_str(); "task stopped");
                            return;
                        }
                    }
                })?
        };

        Ok(PeriodicTask {
            name: name.to_owned(),
            join_handle,
            commands,
            stopped,
            busy,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trigger(&self) -> TaskTrigger {
        TaskTrigger {
            sender: self.commands.clone(),
        }
    }

    /// Whether an iteration is executing right now.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Whether the thread is still alive.
    pub fn is_running(&self) -> bool {
        !self.join_handle.is_finished()
    }

    /// Ask the thread to exit after the in-flight iteration, if any. Does not wait.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Err(TrySendError::Full(_)) = self.commands.try_send(Command::Stop) {
            // The buffer holds a run-now: the thread wakes up for it and sees `stopped`.
            log::trace!(target: "splitio", task = self.name.as_str(); "stop requested while a run is queued");
        }
    }

    /// Stop the thread and block until it exits.
    pub fn shutdown(self) -> Result<()> {
        self.stop();
        self.join_handle
            .join()
            .map_err(|_| Error::TaskPanicked)?;
        Ok(())
    }
}

/// Apply randomized `jitter` to `period`.
fn jittered(period: Duration, jitter: Duration) -> Duration {
    Duration::saturating_sub(period, thread_rng().gen_range(Duration::ZERO..=jitter))
}
