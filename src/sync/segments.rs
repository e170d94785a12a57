use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{mpsc, Arc},
};

use crate::{
    storage::{SegmentStorage, SplitStorage},
    sync::{fetcher::SegmentFetcher, workers::WorkerPool},
    Error, Result,
};

/// Brings every segment referenced by stored splits up to date, one worker pool job per segment.
pub(crate) struct SegmentSynchronizer {
    fetcher: Arc<dyn SegmentFetcher>,
    splits: Arc<dyn SplitStorage>,
    segments: Arc<dyn SegmentStorage>,
    pool: Arc<WorkerPool>,
}

impl SegmentSynchronizer {
    pub fn new(
        fetcher: Arc<dyn SegmentFetcher>,
        splits: Arc<dyn SplitStorage>,
        segments: Arc<dyn SegmentStorage>,
        pool: Arc<WorkerPool>,
    ) -> SegmentSynchronizer {
        SegmentSynchronizer {
            fetcher,
            splits,
            segments,
            pool,
        }
    }

    /// Submit one job per segment and wait for every accepted job.
    ///
    /// Jobs rejected by the pool are skipped until the next call. Returns the first failure, if
    /// any, after all accepted jobs have finished. [`Error::Unauthorized`] takes precedence.
    pub fn synchronize(&self) -> Result<()> {
        let names = self.splits.segment_names()?;
        let (done, results) = mpsc::channel::<Result<()>>();

        let mut accepted = 0;
        let mut failure = None;
        for name in names {
            let job = {
                let fetcher = Arc::clone(&self.fetcher);
                let segments = Arc::clone(&self.segments);
                let done = done.clone();
                let name = name.clone();
                move || {
                    let result = catch_unwind(AssertUnwindSafe(|| {
                        sync_segment(fetcher.as_ref(), segments.as_ref(), &name)
                    }))
                    .unwrap_or(Err(Error::TaskPanicked));
                    if let Err(err) = &result {
                        log::warn!(target: "splitio", segment_name = name.as_str(); "failed to synchronize segment: {err}");
                    }
                    // The receiver only goes away if the caller stopped waiting.
                    let _ = done.send(result);
                }
            };

            match self.pool.submit(job) {
                Ok(()) => accepted += 1,
                Err(err) => {
                    log::warn!(target: "splitio", segment_name = name.as_str(); "segment sync job rejected: {err}");
                    failure.get_or_insert(err);
                }
            }
        }
        drop(done);

        for result in results.iter().take(accepted) {
            match result {
                Ok(()) => {}
                Err(Error::Unauthorized) => failure = Some(Error::Unauthorized),
                Err(err) => {
                    failure.get_or_insert(err);
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Apply change-sets to segment `name` until the control plane reports no newer changes.
fn sync_segment(
    fetcher: &dyn SegmentFetcher,
    storage: &dyn SegmentStorage,
    name: &str,
) -> Result<()> {
    loop {
        let till = storage.till(name)?;
        let changes = fetcher.fetch(name, till)?;

        if changes.till <= till {
            return Ok(());
        }

        let mut members = storage.get(name)?.unwrap_or_default();
        for key in &changes.removed {
            members.remove(key);
        }
        members.extend(changes.added);
        log::debug!(target: "splitio",
            segment_name = name,
            till = changes.till,
            removed = changes.removed.len(),
            members = members.len();
            "applying segment changes");
        storage.put(name, members, changes.till)?;

        if changes.since == changes.till {
            return Ok(());
        }
    }
}
