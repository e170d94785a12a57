//! Process-local storage.
mod impressions;
mod metrics;
mod segments;
mod splits;

pub use impressions::InMemoryImpressionStorage;
pub use metrics::InMemoryMetricsStorage;
pub use segments::InMemorySegmentStorage;
pub use splits::InMemorySplitStorage;
