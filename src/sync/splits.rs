use std::sync::Arc;

use crate::{
    models::SplitStatus,
    storage::SplitStorage,
    sync::fetcher::SplitFetcher,
    Result,
};

/// Brings split storage up to date with the control plane.
pub(crate) struct SplitSynchronizer {
    fetcher: Arc<dyn SplitFetcher>,
    storage: Arc<dyn SplitStorage>,
}

impl SplitSynchronizer {
    pub fn new(
        fetcher: Arc<dyn SplitFetcher>,
        storage: Arc<dyn SplitStorage>,
    ) -> SplitSynchronizer {
        SplitSynchronizer { fetcher, storage }
    }

    /// Fetch and apply change-sets starting at the stored till until the control plane reports no
    /// newer changes.
    pub fn synchronize(&self) -> Result<()> {
        loop {
            let till = self.storage.till()?;
            let changes = self.fetcher.fetch(till)?;

            if changes.till <= till {
                if changes.till < till {
                    log::debug!(target: "splitio", stored_till = till, fetched_till = changes.till; "ignoring stale split changes");
                }
                return Ok(());
            }

            let (active, archived): (Vec<_>, Vec<_>) = changes
                .splits
                .into_iter()
                .partition(|split| split.status == SplitStatus::Active);

            for split in &archived {
                self.storage.remove(&split.name)?;
            }
            log::debug!(target: "splitio",
                since = changes.since,
                till = changes.till,
                updated = active.len(),
                archived = archived.len();
                "applying split changes");
            self.storage.put_many(active, changes.till)?;

            if changes.since == changes.till {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::SplitSynchronizer;
    use crate::{
        models::{ChangeNumber, SplitStatus},
        storage::{memory::InMemorySplitStorage, test_support::split, SplitStorage},
        sync::fetcher::SplitChanges,
        Error, Result,
    };

    /// Serves canned change-sets keyed by `since` and records every request.
    fn fetcher(
        responses: Vec<(ChangeNumber, SplitChanges)>,
        requests: Arc<Mutex<Vec<ChangeNumber>>>,
    ) -> impl Fn(ChangeNumber) -> Result<SplitChanges> + Send + Sync {
        move |since| {
            requests.lock().unwrap().push(since);
            Ok(responses
                .iter()
                .find(|(key, _)| *key == since)
                .map(|(_, changes)| changes.clone())
                .unwrap_or(SplitChanges {
                    splits: Vec::new(),
                    since,
                    till: since,
                }))
        }
    }

    #[test]
    fn follows_change_sets_until_caught_up() {
        let _ = env_logger::builder().is_test(true).try_init();
        let storage = Arc::new(InMemorySplitStorage::new());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let mut archived = split("old", "account", 5);
        archived.status = SplitStatus::Archived;

        let sync = SplitSynchronizer::new(
            Arc::new(fetcher(
                vec![
                    (
                        -1,
                        SplitChanges {
                            splits: vec![split("a", "user", 5), split("old", "account", 4)],
                            since: -1,
                            till: 5,
                        },
                    ),
                    (
                        5,
                        SplitChanges {
                            splits: vec![archived, split("b", "user", 7)],
                            since: 5,
                            till: 7,
                        },
                    ),
                ],
                requests.clone(),
            )),
            storage.clone(),
        );

        sync.synchronize().unwrap();

        assert_eq!(*requests.lock().unwrap(), vec![-1, 5, 7]);
        assert_eq!(storage.till().unwrap(), 7);
        assert!(storage.get("a").unwrap().is_some());
        assert!(storage.get("b").unwrap().is_some());
        assert!(storage.get("old").unwrap().is_none());
        assert!(!storage.traffic_type_exists("account").unwrap());
    }

    #[test]
    fn ignores_stale_change_sets() {
        let storage = Arc::new(InMemorySplitStorage::new());
        storage.put_many(vec![split("a", "user", 10)], 10).unwrap();

        let sync = SplitSynchronizer::new(
            Arc::new(|since: ChangeNumber| -> Result<SplitChanges> {
                Ok(SplitChanges {
                    splits: vec![split("a", "account", 3)],
                    since,
                    till: 3,
                })
            }),
            storage.clone(),
        );

        sync.synchronize().unwrap();

        assert_eq!(storage.till().unwrap(), 10);
        assert_eq!(storage.get("a").unwrap().unwrap().traffic_type_name, "user");
    }

    #[test]
    fn propagates_fetch_errors() {
        let storage = Arc::new(InMemorySplitStorage::new());
        let sync = SplitSynchronizer::new(
            Arc::new(|_: ChangeNumber| -> Result<SplitChanges> { Err(Error::Unauthorized) }),
            storage.clone(),
        );

        assert!(matches!(sync.synchronize(), Err(Error::Unauthorized)));
        assert_eq!(storage.till().unwrap(), -1);
    }
}
