//! Background synchronization.
//!
//! [`SyncManager`] supervises six periodic tasks: split sync, segment sync and the four telemetry
//! flushers. Talking to the control plane is delegated to the [`fetcher`] and [`recorder`] traits.
pub mod fetcher;
pub mod recorder;

mod flush;
mod manager;
mod segments;
mod splits;
mod task;
mod workers;

pub use fetcher::{SegmentChanges, SegmentFetcher, SplitChanges, SplitFetcher};
pub use manager::{SyncManager, SyncServices, TaskKind};
pub use recorder::{ImpressionRecorder, MetricsRecorder, NoopRecorder};
pub use workers::WorkerPool;
