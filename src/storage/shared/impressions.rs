use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    storage::{
        shared::{PrefixedClient, IMPRESSIONS_KEY},
        Impression, ImpressionStorage,
    },
    Result, SdkMetadata,
};

/// Impression queue kept in a shared backend list.
///
/// The queue key gets its time-to-live exactly once, when a push creates it. Later pushes leave
/// the expiration alone, so an unconsumed queue is eventually dropped.
pub struct SharedImpressionStorage {
    client: PrefixedClient,
    metadata: SdkMetadata,
    ttl: Duration,
}

/// Queue entry: an impression tagged with the SDK instance that produced it.
#[derive(Debug, Serialize, Deserialize)]
struct QueuedImpression {
    #[serde(rename = "m")]
    metadata: SdkMetadata,
    #[serde(rename = "i")]
    impression: Impression,
}

impl SharedImpressionStorage {
    /// Create an impression queue on top of `client`.
    pub fn new(client: PrefixedClient, metadata: SdkMetadata, ttl: Duration) -> Self {
        SharedImpressionStorage {
            client,
            metadata,
            ttl,
        }
    }
}

impl ImpressionStorage for SharedImpressionStorage {
    fn log_impressions(&self, impressions: &[Impression]) -> Result<()> {
        if impressions.is_empty() {
            return Ok(());
        }

        let values = impressions
            .iter()
            .map(|impression| {
                serde_json::to_string(&QueuedImpression {
                    metadata: self.metadata.clone(),
                    impression: impression.clone(),
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let len = self.client.push_back(IMPRESSIONS_KEY, &values)?;
        // The list only holds what we pushed, so this push created the key.
        if len == values.len() {
            let key = self.client.key(IMPRESSIONS_KEY);
            log::debug!(target: "splitio", "Proceeding to set expiration for: {key}");
            self.client.expire(IMPRESSIONS_KEY, self.ttl)?;
        }
        Ok(())
    }

    fn pop_n(&self, n: usize) -> Result<Vec<Impression>> {
        let values = self.client.pop_front(IMPRESSIONS_KEY, n)?;
        Ok(values
            .iter()
            .filter_map(|value| match serde_json::from_str::<QueuedImpression>(value) {
                Ok(queued) => Some(queued.impression),
                Err(err) => {
                    log::warn!(target: "splitio", "dropping malformed queued impression: {err}");
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use super::SharedImpressionStorage;
    use crate::{
        storage::{
            shared::{KvBackend, LocalBackend, PrefixedClient},
            test_support::impression,
            ImpressionStorage,
        },
        Result, SdkMetadata,
    };

    /// Backend that counts `expire` calls.
    #[derive(Default)]
    struct CountingBackend {
        inner: LocalBackend,
        expirations: AtomicUsize,
    }

    impl KvBackend for CountingBackend {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key)
        }
        fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
            self.inner.get_many(keys)
        }
        fn set(&self, key: &str, value: &str) -> Result<()> {
            self.inner.set(key, value)
        }
        fn del(&self, keys: &[String]) -> Result<()> {
            self.inner.del(keys)
        }
        fn take(&self, key: &str) -> Result<Option<String>> {
            self.inner.take(key)
        }
        fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
            self.inner.incr_by(key, delta)
        }
        fn keys(&self, prefix: &str) -> Result<Vec<String>> {
            self.inner.keys(prefix)
        }
        fn push_back(&self, key: &str, values: &[String]) -> Result<usize> {
            self.inner.push_back(key, values)
        }
        fn pop_front(&self, key: &str, n: usize) -> Result<Vec<String>> {
            self.inner.pop_front(key, n)
        }
        fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
            self.expirations.fetch_add(1, Ordering::SeqCst);
            self.inner.expire(key, ttl)
        }
        fn replace_set(&self, key: &str, members: &HashSet<String>) -> Result<()> {
            self.inner.replace_set(key, members)
        }
        fn set_members(&self, key: &str) -> Result<HashSet<String>> {
            self.inner.set_members(key)
        }
        fn set_contains(&self, key: &str, member: &str) -> Result<bool> {
            self.inner.set_contains(key, member)
        }
    }

    fn metadata() -> SdkMetadata {
        SdkMetadata {
            sdk_version: "rust-test".to_owned(),
            machine_ip: "10.0.0.1".to_owned(),
            machine_name: "instance123".to_owned(),
        }
    }

    #[test]
    fn expiration_is_set_once_per_key_lifetime() {
        let _ = env_logger::builder().is_test(true).try_init();

        let backend = Arc::new(CountingBackend::default());
        let client = PrefixedClient::new(backend.clone(), "testPrefix");
        let storage =
            SharedImpressionStorage::new(client, metadata(), Duration::from_secs(3600));

        storage.log_impressions(&[impression("key1", 111)]).unwrap();
        let ttl = backend
            .inner
            .ttl("testPrefix.SPLITIO.impressions")
            .unwrap()
            .unwrap();
        assert!(ttl <= Duration::from_secs(3600));

        storage.log_impressions(&[impression("key2", 112)]).unwrap();
        assert_eq!(backend.expirations.load(Ordering::SeqCst), 1);

        // Draining the queue ends the key's lifetime; the next push sets a new expiration.
        let popped = storage.pop_n(2).unwrap();
        assert_eq!(popped, vec![impression("key1", 111), impression("key2", 112)]);
        storage.log_impressions(&[impression("key3", 113)]).unwrap();
        assert_eq!(backend.expirations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn pop_n_is_fifo_and_destructive() {
        let backend = Arc::new(LocalBackend::new());
        let client = PrefixedClient::new(backend.clone(), "testPrefix");
        let storage =
            SharedImpressionStorage::new(client, metadata(), Duration::from_secs(3600));

        storage
            .log_impressions(&[impression("a", 1), impression("b", 2), impression("c", 3)])
            .unwrap();
        assert_eq!(
            storage.pop_n(2).unwrap(),
            vec![impression("a", 1), impression("b", 2)]
        );
        assert_eq!(storage.pop_n(2).unwrap(), vec![impression("c", 3)]);
        assert!(storage.pop_n(2).unwrap().is_empty());
    }

    #[test]
    fn queued_format_carries_metadata() {
        let backend = Arc::new(LocalBackend::new());
        let client = PrefixedClient::new(backend.clone(), "");
        let storage =
            SharedImpressionStorage::new(client, metadata(), Duration::from_secs(3600));
        storage.log_impressions(&[impression("a", 1)]).unwrap();

        let raw = backend.pop_front("SPLITIO.impressions", 1).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw[0]).unwrap();
        assert_eq!(value["m"]["n"], "instance123");
        assert_eq!(value["m"]["s"], "rust-test");
        assert_eq!(value["i"]["k"], "a");
        assert_eq!(value["i"]["r"], "default rule");
        assert_eq!(value["i"]["m"], 1);
    }
}
