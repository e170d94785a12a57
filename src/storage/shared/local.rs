use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Mutex,
    time::{Duration, Instant},
};

use crate::{storage::shared::KvBackend, Error, Result};

/// In-process [`KvBackend`] with Redis semantics for the commands shared storages use.
///
/// Useful to run shared storages without a server, e.g., in tests or when several SDK
/// instances live in the same process.
#[derive(Debug, Default)]
pub struct LocalBackend {
    entries: Mutex<HashMap<String, Entry>>,
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

#[derive(Debug)]
enum Value {
    String(String),
    List(VecDeque<String>),
    Set(HashSet<String>),
}

impl Entry {
    fn new(value: Value) -> Entry {
        Entry {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

type Entries = HashMap<String, Entry>;

impl LocalBackend {
    /// Create an empty backend.
    pub fn new() -> LocalBackend {
        LocalBackend::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut Entries) -> Result<T>) -> Result<T> {
        let mut entries = self
            .entries
            .lock()
            .expect("thread holding local backend lock should not panic");
        let now = Instant::now();
        entries.retain(|_, entry| !entry.is_expired(now));
        f(&mut entries)
    }

    /// Remaining time-to-live. `None` if the key is missing or does not expire.
    #[cfg(test)]
    pub(crate) fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.with_entries(|entries| {
            let now = Instant::now();
            Ok(entries
                .get(key)
                .and_then(|entry| entry.expires_at)
                .map(|at| at.saturating_duration_since(now)))
        })
    }
}

fn wrong_type(key: &str) -> Error {
    Error::WrongType {
        key: key.to_owned(),
    }
}

fn string_of<'a>(entries: &'a Entries, key: &str) -> Result<Option<&'a String>> {
    match entries.get(key).map(|entry| &entry.value) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(wrong_type(key)),
    }
}

fn list_of<'a>(entries: &'a mut Entries, key: &str) -> Result<&'a mut VecDeque<String>> {
    let entry = entries
        .entry(key.to_owned())
        .or_insert_with(|| Entry::new(Value::List(VecDeque::new())));
    match &mut entry.value {
        Value::List(list) => Ok(list),
        _ => Err(wrong_type(key)),
    }
}

fn set_of<'a>(entries: &'a Entries, key: &str) -> Result<Option<&'a HashSet<String>>> {
    match entries.get(key).map(|entry| &entry.value) {
        None => Ok(None),
        Some(Value::Set(set)) => Ok(Some(set)),
        Some(_) => Err(wrong_type(key)),
    }
}

impl KvBackend for LocalBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_entries(|entries| Ok(string_of(entries, key)?.cloned()))
    }

    fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        self.with_entries(|entries| {
            // MGET reports values of other types as missing.
            Ok(keys
                .iter()
                .map(|key| string_of(entries, key).ok().flatten().cloned())
                .collect())
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with_entries(|entries| {
            entries.insert(key.to_owned(), Entry::new(Value::String(value.to_owned())));
            Ok(())
        })
    }

    fn del(&self, keys: &[String]) -> Result<()> {
        self.with_entries(|entries| {
            for key in keys {
                entries.remove(key);
            }
            Ok(())
        })
    }

    fn take(&self, key: &str) -> Result<Option<String>> {
        self.with_entries(|entries| {
            let value = string_of(entries, key)?.cloned();
            entries.remove(key);
            Ok(value)
        })
    }

    fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.with_entries(|entries| {
            let current = match string_of(entries, key)? {
                Some(s) => s.parse::<i64>().map_err(|_| wrong_type(key))?,
                None => 0,
            };
            let next = current + delta;
            match entries.get_mut(key) {
                Some(entry) => entry.value = Value::String(next.to_string()),
                None => {
                    entries.insert(key.to_owned(), Entry::new(Value::String(next.to_string())));
                }
            }
            Ok(next)
        })
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.with_entries(|entries| {
            Ok(entries
                .keys()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect())
        })
    }

    fn push_back(&self, key: &str, values: &[String]) -> Result<usize> {
        self.with_entries(|entries| {
            let list = list_of(entries, key)?;
            list.extend(values.iter().cloned());
            Ok(list.len())
        })
    }

    fn pop_front(&self, key: &str, n: usize) -> Result<Vec<String>> {
        self.with_entries(|entries| {
            if !entries.contains_key(key) {
                return Ok(Vec::new());
            }
            let list = list_of(entries, key)?;
            let n = n.min(list.len());
            let popped = list.drain(..n).collect();
            if list.is_empty() {
                entries.remove(key);
            }
            Ok(popped)
        })
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        self.with_entries(|entries| {
            if let Some(entry) = entries.get_mut(key) {
                entry.expires_at = Some(Instant::now() + ttl);
            }
            Ok(())
        })
    }

    fn replace_set(&self, key: &str, members: &HashSet<String>) -> Result<()> {
        self.with_entries(|entries| {
            // Redis never keeps empty sets around.
            if members.is_empty() {
                entries.remove(key);
            } else {
                entries.insert(key.to_owned(), Entry::new(Value::Set(members.clone())));
            }
            Ok(())
        })
    }

    fn set_members(&self, key: &str) -> Result<HashSet<String>> {
        self.with_entries(|entries| Ok(set_of(entries, key)?.cloned().unwrap_or_default()))
    }

    fn set_contains(&self, key: &str, member: &str) -> Result<bool> {
        self.with_entries(|entries| Ok(set_of(entries, key)?.is_some_and(|set| set.contains(member))))
    }
}
