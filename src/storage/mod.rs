//! Versioned definition store and telemetry aggregator.
//!
//! Every store is defined as a trait with two implementations: [`memory`] keeps data in the
//! process, [`shared`] keeps it in a key-value backend (Redis) shared by several processes. Both
//! implementations uphold the same contract, so the evaluator and sync tasks are written once
//! against the traits.
//!
//! "Not found" is never an error. Errors returned from these traits always mean that the backend
//! failed; callers decide how to degrade.
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::{
    models::{ChangeNumber, Split},
    Result,
};

pub mod memory;
pub mod shared;

/// Change number reported for splits or segments that were never stored.
pub const NO_CHANGE_NUMBER: ChangeNumber = -1;

/// The four stores used by one SDK instance.
#[derive(Clone)]
#[allow(missing_docs)]
pub struct Storages {
    pub splits: Arc<dyn SplitStorage>,
    pub segments: Arc<dyn SegmentStorage>,
    pub impressions: Arc<dyn ImpressionStorage>,
    pub metrics: Arc<dyn MetricsStorage>,
}

/// Cache of split definitions.
pub trait SplitStorage: Send + Sync {
    /// Get split by name.
    fn get(&self, name: &str) -> Result<Option<Arc<Split>>>;

    /// Get several splits at once. The returned map has an entry for every requested name, with
    /// `None` for splits that are not stored.
    fn fetch_many(&self, names: &[&str]) -> Result<HashMap<String, Option<Arc<Split>>>>;

    /// Get all stored splits.
    fn get_all(&self) -> Result<Vec<Arc<Split>>>;

    /// Upsert each split by name, then record `till` as the last seen change number.
    ///
    /// Each split write is atomic; the batch as a whole is not.
    fn put_many(&self, splits: Vec<Split>, till: ChangeNumber) -> Result<()>;

    /// Remove a split. Removing an absent split is a no-op.
    fn remove(&self, name: &str) -> Result<()>;

    /// Names of all stored splits.
    fn split_names(&self) -> Result<HashSet<String>>;

    /// Union of segment names referenced by stored splits.
    fn segment_names(&self) -> Result<HashSet<String>> {
        Ok(self
            .get_all()?
            .iter()
            .flat_map(|split| split.segment_names().map(str::to_owned))
            .collect())
    }

    /// Whether at least one stored split declares `traffic_type`.
    fn traffic_type_exists(&self, traffic_type: &str) -> Result<bool>;

    /// Last change number passed to [`SplitStorage::put_many`], or [`NO_CHANGE_NUMBER`].
    fn till(&self) -> Result<ChangeNumber>;

    /// Remove all splits, traffic types and the change number.
    fn clear(&self) -> Result<()>;
}

/// Cache of segment memberships.
pub trait SegmentStorage: Send + Sync {
    /// Get segment members.
    fn get(&self, name: &str) -> Result<Option<HashSet<String>>>;

    /// Replace segment membership entirely and record its change number.
    fn put(&self, name: &str, keys: HashSet<String>, till: ChangeNumber) -> Result<()>;

    /// Remove a segment and its change number.
    fn remove(&self, name: &str) -> Result<()>;

    /// Whether `key` is a member of segment `name`. Absent segments contain nothing.
    fn contains_key(&self, name: &str, key: &str) -> Result<bool>;

    /// Change number of segment `name`, or [`NO_CHANGE_NUMBER`].
    fn till(&self, name: &str) -> Result<ChangeNumber>;

    /// Remove all segments.
    fn clear(&self) -> Result<()>;
}

/// Queue of impressions waiting to be sent.
pub trait ImpressionStorage: Send + Sync {
    /// Append impressions to the end of the queue.
    fn log_impressions(&self, impressions: &[Impression]) -> Result<()>;

    /// Remove and return up to `n` oldest impressions.
    fn pop_n(&self, n: usize) -> Result<Vec<Impression>>;
}

/// Gauges, counters and latency histograms waiting to be sent.
///
/// Pops are destructive: data returned by a pop is gone from the storage and samples recorded
/// concurrently with a pop are kept for the next one.
pub trait MetricsStorage: Send + Sync {
    /// Set gauge value. Last write wins.
    fn put_gauge(&self, name: &str, value: f64) -> Result<()>;

    /// Remove and return all gauges.
    fn pop_gauges(&self) -> Result<HashMap<String, f64>>;

    /// Increment counter by one.
    fn inc_counter(&self, name: &str) -> Result<()>;

    /// Remove and return all counters.
    fn pop_counters(&self) -> Result<HashMap<String, i64>>;

    /// Increment the count of latency histogram `name` at `bucket`.
    fn inc_latency(&self, name: &str, bucket: usize) -> Result<()>;

    /// Remove and return all latency histograms as `name -> bucket -> count`.
    fn pop_latencies(&self) -> Result<HashMap<String, HashMap<usize, i64>>>;
}

/// Record of a single evaluation decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Impression {
    /// Matching key.
    #[serde(rename = "k")]
    pub key_name: String,
    /// Bucketing key.
    #[serde(rename = "b")]
    pub bucketing_key: String,
    /// Split name.
    #[serde(rename = "f")]
    pub feature_name: String,
    /// Treatment served.
    #[serde(rename = "t")]
    pub treatment: String,
    /// Why the treatment was served.
    #[serde(rename = "r")]
    pub label: String,
    /// Change number of the split that was evaluated.
    #[serde(rename = "c")]
    pub change_number: ChangeNumber,
    /// Milliseconds since Unix epoch.
    #[serde(rename = "m")]
    pub time: i64,
}
