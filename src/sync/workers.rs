//! Fixed-size thread pool with a bounded backlog.
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        mpsc::{Receiver, SyncSender, TrySendError},
        Arc, Mutex,
    },
    thread::JoinHandle,
};

use crate::{Error, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs submitted jobs on a fixed number of threads.
///
/// At most `backlog` jobs wait for a free worker. Submitting while the backlog is full fails
/// immediately with [`Error::BacklogFull`] instead of blocking.
pub struct WorkerPool {
    sender: Mutex<Option<SyncSender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Start `workers` threads named `<name>-<index>`.
    pub fn new(name: &str, workers: usize, backlog: usize) -> std::io::Result<WorkerPool> {
        let (sender, receiver) = std::sync::mpsc::sync_channel::<Job>(backlog);
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..workers)
            .map(|index| {
                let receiver = Arc::clone(&receiver);
                std::thread::Builder::new()
                    .name(format!("{name}-{index}"))
                    .spawn(move || work(&receiver))
            })
            .collect::<std::io::Result<Vec<_>>>()?;

        Ok(WorkerPool {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
        })
    }

    /// Queue `job` for execution.
    ///
    /// # Errors
    ///
    /// - [`Error::BacklogFull`] if `backlog` jobs are already waiting.
    /// - [`Error::WorkerPoolStopped`] after [`WorkerPool::shutdown`].
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> Result<()> {
        let sender = self
            .sender
            .lock()
            .expect("thread holding worker pool lock should not panic");
        let Some(sender) = sender.as_ref() else {
            return Err(Error::WorkerPoolStopped);
        };
        sender.try_send(Box::new(job)).map_err(|err| match err {
            TrySendError::Full(_) => Error::BacklogFull,
            TrySendError::Disconnected(_) => Error::WorkerPoolStopped,
        })
    }

    /// Stop accepting jobs, let the workers drain the backlog and wait for them to exit.
    pub fn shutdown(&self) -> Result<()> {
        self.sender
            .lock()
            .expect("thread holding worker pool lock should not panic")
            .take();

        let handles = std::mem::take(
            &mut *self
                .workers
                .lock()
                .expect("thread holding worker pool lock should not panic"),
        );
        for handle in handles {
            handle.join().map_err(|_| Error::TaskPanicked)?;
        }
        Ok(())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Workers exit on their own once the sender is gone; no need to join them here.
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }
}

fn work(receiver: &Mutex<Receiver<Job>>) {
    loop {
        // The guard is released before the job runs so other workers can pick up jobs.
        let job = match receiver.lock() {
            Ok(receiver) => receiver.recv(),
            Err(_) => return,
        };
        let Ok(job) = job else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            log::error!(target: "splitio", "worker job panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            mpsc, Arc,
        },
        time::Duration,
    };

    use super::WorkerPool;
    use crate::Error;

    #[test]
    fn runs_jobs() {
        let _ = env_logger::builder().is_test(true).try_init();
        let pool = WorkerPool::new("test-pool", 3, 10).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let done = done.clone();
            pool.submit(move || {
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.shutdown().unwrap();

        assert_eq!(done.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn rejects_jobs_beyond_backlog() {
        let _ = env_logger::builder().is_test(true).try_init();
        let pool = WorkerPool::new("busy-pool", 1, 2).unwrap();
        let (release, blocked) = mpsc::channel::<()>();
        let (started_tx, started) = mpsc::channel::<()>();

        // Occupy the only worker.
        pool.submit(move || {
            started_tx.send(()).unwrap();
            blocked.recv().unwrap();
        })
        .unwrap();
        started.recv_timeout(Duration::from_secs(5)).unwrap();

        pool.submit(|| {}).unwrap();
        pool.submit(|| {}).unwrap();
        assert!(matches!(pool.submit(|| {}), Err(Error::BacklogFull)));

        release.send(()).unwrap();
        pool.shutdown().unwrap();
    }

    #[test]
    fn panicking_job_does_not_kill_worker() {
        let _ = env_logger::builder().is_test(true).try_init();
        let pool = WorkerPool::new("panic-pool", 1, 4).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        pool.submit(|| panic!("job failed")).unwrap();
        pool.submit({
            let done = done.clone();
            move || {
                done.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();
        pool.shutdown().unwrap();

        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rejects_jobs_after_shutdown() {
        let pool = WorkerPool::new("stopped-pool", 1, 1).unwrap();
        pool.shutdown().unwrap();
        assert!(matches!(pool.submit(|| {}), Err(Error::WorkerPoolStopped)));
    }
}
