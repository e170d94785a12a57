//! Sinks for telemetry popped from storage. Delivery and retry are left to the implementor.
use std::collections::HashMap;

use crate::{storage::Impression, Result, SdkMetadata};

/// Sends impressions to the control plane.
pub trait ImpressionRecorder: Send + Sync {
    #[allow(missing_docs)]
    fn record(&self, impressions: Vec<Impression>, metadata: &SdkMetadata) -> Result<()>;
}

/// Sends aggregated metrics to the control plane.
pub trait MetricsRecorder: Send + Sync {
    #[allow(missing_docs)]
    fn record_gauges(&self, gauges: HashMap<String, f64>, metadata: &SdkMetadata) -> Result<()>;
    #[allow(missing_docs)]
    fn record_counters(&self, counters: HashMap<String, i64>, metadata: &SdkMetadata)
        -> Result<()>;
    /// Latency histograms, bucket index to count, per metric name.
    fn record_latencies(
        &self,
        latencies: HashMap<String, HashMap<usize, i64>>,
        metadata: &SdkMetadata,
    ) -> Result<()>;
}

/// Recorder that discards everything. Used when no recorder is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl ImpressionRecorder for NoopRecorder {
    fn record(&self, _impressions: Vec<Impression>, _metadata: &SdkMetadata) -> Result<()> {
        Ok(())
    }
}

impl MetricsRecorder for NoopRecorder {
    fn record_gauges(&self, _gauges: HashMap<String, f64>, _metadata: &SdkMetadata) -> Result<()> {
        Ok(())
    }

    fn record_counters(
        &self,
        _counters: HashMap<String, i64>,
        _metadata: &SdkMetadata,
    ) -> Result<()> {
        Ok(())
    }

    fn record_latencies(
        &self,
        _latencies: HashMap<String, HashMap<usize, i64>>,
        _metadata: &SdkMetadata,
    ) -> Result<()> {
        Ok(())
    }
}
