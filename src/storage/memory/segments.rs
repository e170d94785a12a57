use std::{
    collections::{HashMap, HashSet},
    sync::RwLock,
};

use crate::{
    models::ChangeNumber,
    storage::{SegmentStorage, NO_CHANGE_NUMBER},
    Result,
};

/// In-process segment cache.
#[derive(Default)]
pub struct InMemorySegmentStorage {
    segments: RwLock<HashMap<String, Segment>>,
}

struct Segment {
    keys: HashSet<String>,
    till: ChangeNumber,
}

impl InMemorySegmentStorage {
    /// Create an empty segment cache.
    pub fn new() -> InMemorySegmentStorage {
        InMemorySegmentStorage::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Segment>> {
        self.segments
            .read()
            .expect("thread holding segment storage lock should not panic")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Segment>> {
        self.segments
            .write()
            .expect("thread holding segment storage lock should not panic")
    }
}

impl SegmentStorage for InMemorySegmentStorage {
    fn get(&self, name: &str) -> Result<Option<HashSet<String>>> {
        Ok(self.read().get(name).map(|segment| segment.keys.clone()))
    }

    fn put(&self, name: &str, keys: HashSet<String>, till: ChangeNumber) -> Result<()> {
        self.write().insert(name.to_owned(), Segment { keys, till });
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.write().remove(name);
        Ok(())
    }

    fn contains_key(&self, name: &str, key: &str) -> Result<bool> {
        Ok(self
            .read()
            .get(name)
            .is_some_and(|segment| segment.keys.contains(key)))
    }

    fn till(&self, name: &str) -> Result<ChangeNumber> {
        Ok(self
            .read()
            .get(name)
            .map_or(NO_CHANGE_NUMBER, |segment| segment.till))
    }

    fn clear(&self) -> Result<()> {
        self.write().clear();
        Ok(())
    }
}
