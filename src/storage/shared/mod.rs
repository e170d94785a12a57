//! Storage in a key-value backend shared between processes (Redis).
//!
//! Keys live under `<prefix>.` (no namespace when the prefix is empty):
//!
//! | Key | Value |
//! |---|---|
//! | `SPLITIO.split.<name>` | split as JSON |
//! | `SPLITIO.splits.till` | change number of the last split sync |
//! | `SPLITIO.trafficType.<name>` | number of splits using the traffic type |
//! | `SPLITIO.segment.<name>` | set of segment members |
//! | `SPLITIO.segment.<name>.till` | change number of the segment |
//! | `SPLITIO.impressions` | list of queued impressions |
//! | `SPLITIO/<sdk version>/<machine name>/gauge.<name>` | gauge value |
//! | `SPLITIO/<sdk version>/<machine name>/count.<name>` | counter value |
//! | `SPLITIO/<sdk version>/<machine name>/latency.<name>.bucket.<index>` | latency count |
mod backend;
mod impressions;
mod local;
mod metrics;
mod redis;
mod segments;
mod splits;

pub use backend::{KvBackend, PrefixedClient};
pub use impressions::SharedImpressionStorage;
pub use local::LocalBackend;
pub use metrics::SharedMetricsStorage;
pub use self::redis::RedisBackend;
pub use segments::SharedSegmentStorage;
pub use splits::SharedSplitStorage;

const SPLIT_KEY_PREFIX: &str = "SPLITIO.split.";
const SPLITS_TILL_KEY: &str = "SPLITIO.splits.till";
const TRAFFIC_TYPE_KEY_PREFIX: &str = "SPLITIO.trafficType.";
const SEGMENT_KEY_PREFIX: &str = "SPLITIO.segment.";
const IMPRESSIONS_KEY: &str = "SPLITIO.impressions";
