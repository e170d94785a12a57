use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    models::{ChangeNumber, Split},
    storage::{
        shared::{PrefixedClient, SPLITS_TILL_KEY, SPLIT_KEY_PREFIX, TRAFFIC_TYPE_KEY_PREFIX},
        SplitStorage, NO_CHANGE_NUMBER,
    },
    Result,
};

/// Split cache kept in a shared backend.
///
/// Each split is stored as JSON under its own key, so readers never observe a partially written
/// split. Traffic types are reference counts updated alongside split writes.
pub struct SharedSplitStorage {
    client: PrefixedClient,
}

fn split_key(name: &str) -> String {
    format!("{SPLIT_KEY_PREFIX}{name}")
}

fn traffic_type_key(traffic_type: &str) -> String {
    format!("{TRAFFIC_TYPE_KEY_PREFIX}{traffic_type}")
}

fn parse_split(name: &str, json: &str) -> Option<Split> {
    match serde_json::from_str(json) {
        Ok(split) => Some(split),
        Err(err) => {
            log::warn!(target: "splitio", split_name = name; "failed to parse stored split: {err}");
            None
        }
    }
}

impl SharedSplitStorage {
    /// Create split storage on top of `client`.
    pub fn new(client: PrefixedClient) -> SharedSplitStorage {
        SharedSplitStorage { client }
    }

    fn decrement_traffic_type(&self, traffic_type: &str) -> Result<()> {
        let key = traffic_type_key(traffic_type);
        if self.client.incr_by(&key, -1)? <= 0 {
            self.client.del(&[key])?;
        }
        Ok(())
    }

    fn stored(&self, name: &str) -> Result<Option<Split>> {
        Ok(self
            .client
            .get(&split_key(name))?
            .and_then(|json| parse_split(name, &json)))
    }
}

impl SplitStorage for SharedSplitStorage {
    fn get(&self, name: &str) -> Result<Option<Arc<Split>>> {
        match self.client.get(&split_key(name))? {
            Some(json) => Ok(Some(Arc::new(serde_json::from_str(&json)?))),
            None => Ok(None),
        }
    }

    fn fetch_many(&self, names: &[&str]) -> Result<HashMap<String, Option<Arc<Split>>>> {
        let keys: Vec<String> = names.iter().map(|name| split_key(name)).collect();
        let values = self.client.get_many(&keys)?;
        Ok(names
            .iter()
            .zip(values)
            .map(|(&name, json)| {
                let split = json.and_then(|json| parse_split(name, &json)).map(Arc::new);
                (name.to_owned(), split)
            })
            .collect())
    }

    fn get_all(&self) -> Result<Vec<Arc<Split>>> {
        let keys = self.client.keys(SPLIT_KEY_PREFIX)?;
        let values = self.client.get_many(&keys)?;
        Ok(keys
            .iter()
            .zip(values)
            .filter_map(|(key, json)| parse_split(key, &json?))
            .map(Arc::new)
            .collect())
    }

    fn put_many(&self, splits: Vec<Split>, till: ChangeNumber) -> Result<()> {
        for split in splits {
            let previous = self.stored(&split.name)?;
            self.client
                .set(&split_key(&split.name), &serde_json::to_string(&split)?)?;
            self.client
                .incr_by(&traffic_type_key(&split.traffic_type_name), 1)?;
            if let Some(previous) = previous {
                self.decrement_traffic_type(&previous.traffic_type_name)?;
            }
        }
        self.client.set(SPLITS_TILL_KEY, &till.to_string())
    }

    fn remove(&self, name: &str) -> Result<()> {
        if let Some(previous) = self.stored(name)? {
            self.client.del(&[split_key(name)])?;
            self.decrement_traffic_type(&previous.traffic_type_name)?;
        }
        Ok(())
    }

    fn split_names(&self) -> Result<HashSet<String>> {
        Ok(self
            .client
            .keys(SPLIT_KEY_PREFIX)?
            .iter()
            .filter_map(|key| key.strip_prefix(SPLIT_KEY_PREFIX))
            .map(str::to_owned)
            .collect())
    }

    fn traffic_type_exists(&self, traffic_type: &str) -> Result<bool> {
        let count = self
            .client
            .get(&traffic_type_key(traffic_type))?
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or(0);
        Ok(count > 0)
    }

    fn till(&self) -> Result<ChangeNumber> {
        Ok(self
            .client
            .get(SPLITS_TILL_KEY)?
            .and_then(|value| value.parse().ok())
            .unwrap_or(NO_CHANGE_NUMBER))
    }

    fn clear(&self) -> Result<()> {
        let mut keys = self.client.keys(SPLIT_KEY_PREFIX)?;
        keys.extend(self.client.keys(TRAFFIC_TYPE_KEY_PREFIX)?);
        keys.push(SPLITS_TILL_KEY.to_owned());
        self.client.del(&keys)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use super::SharedSplitStorage;
    use crate::storage::{
        shared::{KvBackend, LocalBackend, PrefixedClient},
        test_support::{split, split_with_segments},
        SplitStorage, NO_CHANGE_NUMBER,
    };

    fn storage() -> (Arc<LocalBackend>, SharedSplitStorage) {
        let backend = Arc::new(LocalBackend::new());
        let client = PrefixedClient::new(backend.clone(), "testPrefix");
        (backend, SharedSplitStorage::new(client))
    }

    #[test]
    fn put_many_then_read_back() {
        let (backend, storage) = storage();
        storage
            .put_many(
                vec![
                    split("split1", "user", 1),
                    split("split2", "user", 2),
                    split("split3", "user", 3),
                    split("split4", "user", 4),
                ],
                123,
            )
            .unwrap();

        let s1 = storage.get("split1").unwrap().unwrap();
        assert_eq!(s1.name, "split1");
        assert_eq!(s1.change_number, 1);
        assert_eq!(storage.till().unwrap(), 123);
        assert_eq!(
            storage.split_names().unwrap(),
            ["split1", "split2", "split3", "split4"]
                .iter()
                .map(|s| s.to_string())
                .collect::<HashSet<_>>()
        );
        assert!(backend
            .get("testPrefix.SPLITIO.split.split1")
            .unwrap()
            .is_some());
        assert_eq!(
            backend
                .get("testPrefix.SPLITIO.splits.till")
                .unwrap()
                .as_deref(),
            Some("123")
        );
    }

    #[test]
    fn removed_splits_are_reported_absent() {
        let (_, storage) = storage();
        storage
            .put_many(vec![split("split1", "user", 1), split("split2", "user", 2)], 2)
            .unwrap();
        storage.remove("split1").unwrap();
        storage.remove("split1").unwrap();

        assert!(storage.get("split1").unwrap().is_none());
        let fetched = storage.fetch_many(&["split1", "split2"]).unwrap();
        assert_eq!(fetched.len(), 2);
        assert!(fetched["split1"].is_none());
        assert_eq!(fetched["split2"].as_ref().unwrap().change_number, 2);
    }

    #[test]
    fn segment_names_are_derived_from_splits() {
        let (_, storage) = storage();
        storage
            .put_many(
                vec![
                    split_with_segments("split5", &["segment1"]),
                    split_with_segments("split6", &["segment2", "segment3"]),
                ],
                123,
            )
            .unwrap();
        assert_eq!(
            storage.segment_names().unwrap(),
            ["segment1", "segment2", "segment3"]
                .iter()
                .map(|s| s.to_string())
                .collect::<HashSet<_>>()
        );
    }

    #[test]
    fn clear_leaves_unrelated_keys_untouched() {
        let (backend, storage) = storage();
        storage
            .put_many(vec![split("split1", "user", 1), split("split2", "user", 2)], 10)
            .unwrap();
        backend.set("key1", "value1").unwrap();
        backend.set("key2", "value2").unwrap();
        backend.set("otherPrefix.SPLITIO.split.split1", "{}").unwrap();

        storage.clear().unwrap();

        assert!(storage.get_all().unwrap().is_empty());
        assert_eq!(storage.till().unwrap(), NO_CHANGE_NUMBER);
        assert!(!storage.traffic_type_exists("user").unwrap());
        assert_eq!(backend.get("key1").unwrap().as_deref(), Some("value1"));
        assert_eq!(backend.get("key2").unwrap().as_deref(), Some("value2"));
        assert!(backend
            .get("otherPrefix.SPLITIO.split.split1")
            .unwrap()
            .is_some());

        let fetched = storage.fetch_many(&["split1", "split2"]).unwrap();
        assert_eq!(fetched.len(), 2);
        assert!(fetched.values().all(Option::is_none));
    }

    #[test]
    fn traffic_type_follows_live_splits() {
        let (backend, storage) = storage();
        storage
            .put_many(vec![split("split1", "mytraffictype", 1)], 1)
            .unwrap();
        assert!(storage.traffic_type_exists("mytraffictype").unwrap());
        assert_eq!(
            backend
                .get("testPrefix.SPLITIO.trafficType.mytraffictype")
                .unwrap()
                .as_deref(),
            Some("1")
        );

        // Re-putting the same split must not inflate the count.
        storage
            .put_many(vec![split("split1", "mytraffictype", 2)], 2)
            .unwrap();
        storage.remove("split1").unwrap();
        assert!(!storage.traffic_type_exists("mytraffictype").unwrap());
        assert!(!storage.traffic_type_exists("unknown").unwrap());
    }

    #[test]
    fn corrupt_split_is_an_error_on_get_and_skipped_elsewhere() {
        let (backend, storage) = storage();
        storage.put_many(vec![split("good", "user", 1)], 1).unwrap();
        backend.set("testPrefix.SPLITIO.split.bad", "not json").unwrap();

        assert!(storage.get("bad").is_err());
        assert_eq!(storage.get_all().unwrap().len(), 1);
        assert!(storage.fetch_many(&["bad"]).unwrap()["bad"].is_none());
    }
}
