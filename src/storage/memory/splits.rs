use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock},
};

use crate::{
    models::{ChangeNumber, Split},
    storage::{SplitStorage, NO_CHANGE_NUMBER},
    Result,
};

/// In-process split cache providing concurrent access for readers (evaluation) and a writer
/// (split sync).
///
/// Splits are immutable and only ever replaced completely, so readers get cheap `Arc` clones.
#[derive(Default)]
pub struct InMemorySplitStorage {
    state: RwLock<State>,
}

struct State {
    splits: HashMap<String, Arc<Split>>,
    traffic_types: HashMap<String, usize>,
    till: ChangeNumber,
}

impl Default for State {
    fn default() -> State {
        State {
            splits: HashMap::new(),
            traffic_types: HashMap::new(),
            till: NO_CHANGE_NUMBER,
        }
    }
}

impl State {
    fn remove(&mut self, name: &str) {
        if let Some(old) = self.splits.remove(name) {
            self.decrement_traffic_type(&old.traffic_type_name);
        }
    }

    fn decrement_traffic_type(&mut self, traffic_type: &str) {
        if let Some(count) = self.traffic_types.get_mut(traffic_type) {
            *count -= 1;
            if *count == 0 {
                self.traffic_types.remove(traffic_type);
            }
        }
    }
}

impl InMemorySplitStorage {
    /// Create an empty split cache.
    pub fn new() -> InMemorySplitStorage {
        InMemorySplitStorage::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        // Err() is possible only if the lock is poisoned (writer panicked while holding the
        // lock), which should never happen.
        self.state
            .read()
            .expect("thread holding split storage lock should not panic")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state
            .write()
            .expect("thread holding split storage lock should not panic")
    }
}

impl SplitStorage for InMemorySplitStorage {
    fn get(&self, name: &str) -> Result<Option<Arc<Split>>> {
        Ok(self.read().splits.get(name).cloned())
    }

    fn fetch_many(&self, names: &[&str]) -> Result<HashMap<String, Option<Arc<Split>>>> {
        let state = self.read();
        Ok(names
            .iter()
            .map(|&name| (name.to_owned(), state.splits.get(name).cloned()))
            .collect())
    }

    fn get_all(&self) -> Result<Vec<Arc<Split>>> {
        Ok(self.read().splits.values().cloned().collect())
    }

    fn put_many(&self, splits: Vec<Split>, till: ChangeNumber) -> Result<()> {
        let mut state = self.write();
        for split in splits {
            state.remove(&split.name);
            *state
                .traffic_types
                .entry(split.traffic_type_name.clone())
                .or_default() += 1;
            state.splits.insert(split.name.clone(), Arc::new(split));
        }
        state.till = till;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.write().remove(name);
        Ok(())
    }

    fn split_names(&self) -> Result<HashSet<String>> {
        Ok(self.read().splits.keys().cloned().collect())
    }

    fn traffic_type_exists(&self, traffic_type: &str) -> Result<bool> {
        Ok(self.read().traffic_types.contains_key(traffic_type))
    }

    fn till(&self) -> Result<ChangeNumber> {
        Ok(self.read().till)
    }

    fn clear(&self) -> Result<()> {
        *self.write() = State::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use super::InMemorySplitStorage;
    use crate::storage::{
        test_support::{split, split_with_segments},
        SplitStorage, NO_CHANGE_NUMBER,
    };

    #[test]
    fn put_many_then_read_back() {
        let storage = InMemorySplitStorage::new();
        assert_eq!(storage.till().unwrap(), NO_CHANGE_NUMBER);

        storage
            .put_many(
                vec![split("split1", "user", 1), split("split2", "user", 2)],
                123,
            )
            .unwrap();

        assert_eq!(storage.till().unwrap(), 123);
        assert_eq!(storage.get("split1").unwrap().unwrap().change_number, 1);
        assert_eq!(storage.get_all().unwrap().len(), 2);
        assert_eq!(
            storage.split_names().unwrap(),
            HashSet::from(["split1".to_owned(), "split2".to_owned()])
        );
    }

    #[test]
    fn fetch_many_reports_every_requested_name() {
        let storage = InMemorySplitStorage::new();
        storage
            .put_many(vec![split("split1", "user", 1), split("split2", "user", 1)], 1)
            .unwrap();
        storage.remove("split2").unwrap();
        storage.remove("split2").unwrap();

        let fetched = storage
            .fetch_many(&["split1", "split2", "split3"])
            .unwrap();
        assert_eq!(fetched.len(), 3);
        assert!(fetched["split1"].is_some());
        assert!(fetched["split2"].is_none());
        assert!(fetched["split3"].is_none());
        assert!(storage.get("split2").unwrap().is_none());
    }

    #[test]
    fn segment_names_are_union_over_splits() {
        let storage = InMemorySplitStorage::new();
        storage
            .put_many(
                vec![
                    split_with_segments("split1", &["segment1", "segment2"]),
                    split_with_segments("split2", &["segment2", "segment3"]),
                ],
                1,
            )
            .unwrap();
        assert_eq!(
            storage.segment_names().unwrap(),
            HashSet::from([
                "segment1".to_owned(),
                "segment2".to_owned(),
                "segment3".to_owned()
            ])
        );
    }

    #[test]
    fn traffic_types_are_reference_counted() {
        let storage = InMemorySplitStorage::new();
        storage
            .put_many(
                vec![split("split1", "user", 1), split("split2", "user", 1)],
                1,
            )
            .unwrap();
        assert!(storage.traffic_type_exists("user").unwrap());

        // Replacing a split moves its reference to the new traffic type.
        storage
            .put_many(vec![split("split2", "account", 2)], 2)
            .unwrap();
        assert!(storage.traffic_type_exists("account").unwrap());
        assert!(storage.traffic_type_exists("user").unwrap());

        storage.remove("split1").unwrap();
        assert!(!storage.traffic_type_exists("user").unwrap());
        assert!(storage.traffic_type_exists("account").unwrap());
    }

    #[test]
    fn clear_resets_everything() {
        let storage = InMemorySplitStorage::new();
        storage.put_many(vec![split("split1", "user", 1)], 5).unwrap();
        storage.clear().unwrap();
        assert!(storage.get_all().unwrap().is_empty());
        assert!(!storage.traffic_type_exists("user").unwrap());
        assert_eq!(storage.till().unwrap(), NO_CHANGE_NUMBER);
    }

    #[test]
    fn can_write_from_another_thread() {
        let storage = Arc::new(InMemorySplitStorage::new());
        {
            let storage = storage.clone();
            let _ = std::thread::spawn(move || {
                storage.put_many(vec![split("split1", "user", 1)], 1).unwrap();
            })
            .join();
        }
        assert!(storage.get("split1").unwrap().is_some());
    }
}
