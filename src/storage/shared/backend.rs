use std::{collections::HashSet, sync::Arc, time::Duration};

use crate::Result;

/// Key-value backend shared by several SDK instances.
///
/// Every method is a single backend operation and is atomic on its own. Keys passed to and
/// returned from the backend are full keys; namespacing is done by [`PrefixedClient`].
pub trait KvBackend: Send + Sync {
    /// Get string value.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Get several string values. Returns one entry per key, in order.
    fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// Set string value, clearing any expiration.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete keys. Missing keys are ignored.
    fn del(&self, keys: &[String]) -> Result<()>;

    /// Get string value and delete the key in one operation.
    fn take(&self, key: &str) -> Result<Option<String>>;

    /// Increment integer value (missing keys count as zero) and return the new value.
    fn incr_by(&self, key: &str, delta: i64) -> Result<i64>;

    /// All keys starting with `prefix`.
    fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Append values to a list and return the list length after the push.
    fn push_back(&self, key: &str, values: &[String]) -> Result<usize>;

    /// Remove and return up to `n` values from the front of a list.
    fn pop_front(&self, key: &str, n: usize) -> Result<Vec<String>>;

    /// Set time-to-live of a key.
    fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Replace a set with `members` in one operation.
    fn replace_set(&self, key: &str, members: &HashSet<String>) -> Result<()>;

    /// Members of a set. Missing keys are empty sets.
    fn set_members(&self, key: &str) -> Result<HashSet<String>>;

    /// Whether `member` belongs to the set.
    fn set_contains(&self, key: &str, member: &str) -> Result<bool>;
}

/// Backend handle that confines every operation to keys under `<prefix>.`.
///
/// All shared storages go through a `PrefixedClient`, so they can never touch keys of another
/// application (or another SDK prefix) living in the same database.
#[derive(Clone)]
pub struct PrefixedClient {
    backend: Arc<dyn KvBackend>,
    prefix: String,
}

impl PrefixedClient {
    /// Wrap `backend`. An empty prefix disables namespacing.
    pub fn new(backend: Arc<dyn KvBackend>, prefix: impl Into<String>) -> PrefixedClient {
        PrefixedClient {
            backend,
            prefix: prefix.into(),
        }
    }

    /// Full backend key for `key`.
    pub fn key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_owned()
        } else {
            format!("{}.{}", self.prefix, key)
        }
    }

    fn strip<'a>(&self, key: &'a str) -> &'a str {
        if self.prefix.is_empty() {
            key
        } else {
            key.strip_prefix(&self.prefix)
                .and_then(|rest| rest.strip_prefix('.'))
                .unwrap_or(key)
        }
    }

    fn keys_of(&self, keys: &[String]) -> Vec<String> {
        keys.iter().map(|key| self.key(key)).collect()
    }

    pub(crate) fn get(&self, key: &str) -> Result<Option<String>> {
        self.backend.get(&self.key(key))
    }

    pub(crate) fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.backend.get_many(&self.keys_of(keys))
    }

    pub(crate) fn set(&self, key: &str, value: &str) -> Result<()> {
        self.backend.set(&self.key(key), value)
    }

    pub(crate) fn del(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        self.backend.del(&self.keys_of(keys))
    }

    pub(crate) fn take(&self, key: &str) -> Result<Option<String>> {
        self.backend.take(&self.key(key))
    }

    pub(crate) fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.backend.incr_by(&self.key(key), delta)
    }

    /// Keys under `prefix`, with the namespace stripped.
    pub(crate) fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .backend
            .keys(&self.key(prefix))?
            .iter()
            .map(|key| self.strip(key).to_owned())
            .collect())
    }

    pub(crate) fn push_back(&self, key: &str, values: &[String]) -> Result<usize> {
        self.backend.push_back(&self.key(key), values)
    }

    pub(crate) fn pop_front(&self, key: &str, n: usize) -> Result<Vec<String>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        self.backend.pop_front(&self.key(key), n)
    }

    pub(crate) fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        self.backend.expire(&self.key(key), ttl)
    }

    pub(crate) fn replace_set(&self, key: &str, members: &HashSet<String>) -> Result<()> {
        self.backend.replace_set(&self.key(key), members)
    }

    pub(crate) fn set_members(&self, key: &str) -> Result<HashSet<String>> {
        self.backend.set_members(&self.key(key))
    }

    pub(crate) fn set_contains(&self, key: &str, member: &str) -> Result<bool> {
        self.backend.set_contains(&self.key(key), member)
    }
}
