//! Telemetry flushers: pop from storage and hand the batch to a recorder.
//!
//! Popping is destructive, so a batch the recorder fails to accept is lost. Only
//! [`Error::Unauthorized`] is propagated to stop the task; other failures are logged.
use crate::{
    storage::{ImpressionStorage, MetricsStorage},
    sync::recorder::{ImpressionRecorder, MetricsRecorder},
    Error, Result, SdkMetadata,
};

fn dropped(what: &str, count: usize, result: Result<()>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(Error::Unauthorized) => Err(Error::Unauthorized),
        Err(err) => {
            log::warn!(target: "splitio", count; "failed to record {what}, dropping batch: {err}");
            Ok(())
        }
    }
}

pub(crate) fn flush_impressions(
    storage: &dyn ImpressionStorage,
    recorder: &dyn ImpressionRecorder,
    metadata: &SdkMetadata,
    bulk_size: usize,
) -> Result<()> {
    let impressions = storage.pop_n(bulk_size)?;
    if impressions.is_empty() {
        return Ok(());
    }
    let count = impressions.len();
    log::debug!(target: "splitio", count; "flushing impressions");
    dropped("impressions", count, recorder.record(impressions, metadata))
}

pub(crate) fn flush_gauges(
    storage: &dyn MetricsStorage,
    recorder: &dyn MetricsRecorder,
    metadata: &SdkMetadata,
) -> Result<()> {
    let gauges = storage.pop_gauges()?;
    if gauges.is_empty() {
        return Ok(());
    }
    let count = gauges.len();
    dropped("gauges", count, recorder.record_gauges(gauges, metadata))
}

pub(crate) fn flush_counters(
    storage: &dyn MetricsStorage,
    recorder: &dyn MetricsRecorder,
    metadata: &SdkMetadata,
) -> Result<()> {
    let counters = storage.pop_counters()?;
    if counters.is_empty() {
        return Ok(());
    }
    let count = counters.len();
    dropped("counters", count, recorder.record_counters(counters, metadata))
}

pub(crate) fn flush_latencies(
    storage: &dyn MetricsStorage,
    recorder: &dyn MetricsRecorder,
    metadata: &SdkMetadata,
) -> Result<()> {
    let latencies = storage.pop_latencies()?;
    if latencies.is_empty() {
        return Ok(());
    }
    let count = latencies.len();
    dropped("latencies", count, recorder.record_latencies(latencies, metadata))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::HashMap,
        sync::Mutex,
    };

    use super::{flush_counters, flush_gauges, flush_impressions, flush_latencies};
    use crate::{
        storage::{
            memory::{InMemoryImpressionStorage, InMemoryMetricsStorage},
            test_support::impression,
            Impression, ImpressionStorage, MetricsStorage,
        },
        sync::recorder::{ImpressionRecorder, MetricsRecorder},
        Error, Result, SdkMetadata,
    };

    /// Keeps everything it is handed. Fails every call while `failing` is set.
    #[derive(Default)]
    pub(crate) struct CapturingRecorder {
        pub impressions: Mutex<Vec<Vec<Impression>>>,
        pub gauges: Mutex<Vec<HashMap<String, f64>>>,
        pub counters: Mutex<Vec<HashMap<String, i64>>>,
        pub latencies: Mutex<Vec<HashMap<String, HashMap<usize, i64>>>>,
        pub failing: Option<Error>,
    }

    impl CapturingRecorder {
        fn outcome(&self) -> Result<()> {
            match &self.failing {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }
    }

    impl ImpressionRecorder for CapturingRecorder {
        fn record(&self, impressions: Vec<Impression>, _metadata: &SdkMetadata) -> Result<()> {
            self.impressions.lock().unwrap().push(impressions);
            self.outcome()
        }
    }

    impl MetricsRecorder for CapturingRecorder {
        fn record_gauges(&self, gauges: HashMap<String, f64>, _metadata: &SdkMetadata) -> Result<()> {
            self.gauges.lock().unwrap().push(gauges);
            self.outcome()
        }

        fn record_counters(
            &self,
            counters: HashMap<String, i64>,
            _metadata: &SdkMetadata,
        ) -> Result<()> {
            self.counters.lock().unwrap().push(counters);
            self.outcome()
        }

        fn record_latencies(
            &self,
            latencies: HashMap<String, HashMap<usize, i64>>,
            _metadata: &SdkMetadata,
        ) -> Result<()> {
            self.latencies.lock().unwrap().push(latencies);
            self.outcome()
        }
    }

    fn metadata() -> SdkMetadata {
        SdkMetadata::new("host-1", "10.0.0.1")
    }

    #[test]
    fn impressions_are_flushed_in_bulks() {
        let storage = InMemoryImpressionStorage::new(100);
        storage
            .log_impressions(&[impression("a", 1), impression("b", 2), impression("c", 3)])
            .unwrap();
        let recorder = CapturingRecorder::default();

        flush_impressions(&storage, &recorder, &metadata(), 2).unwrap();
        flush_impressions(&storage, &recorder, &metadata(), 2).unwrap();
        flush_impressions(&storage, &recorder, &metadata(), 2).unwrap();

        let batches = recorder.impressions.lock().unwrap();
        let keys: Vec<Vec<&str>> = batches
            .iter()
            .map(|batch| batch.iter().map(|i| i.key_name.as_str()).collect())
            .collect();
        assert_eq!(keys, vec![vec!["a", "b"], vec!["c"]]);
    }

    #[test]
    fn failed_batches_are_dropped() {
        let _ = env_logger::builder().is_test(true).try_init();
        let storage = InMemoryImpressionStorage::new(100);
        storage.log_impressions(&[impression("a", 1)]).unwrap();
        let recorder = CapturingRecorder {
            failing: Some(Error::Transport("503".to_owned())),
            ..CapturingRecorder::default()
        };

        flush_impressions(&storage, &recorder, &metadata(), 10).unwrap();

        assert!(storage.is_empty());
    }

    #[test]
    fn unauthorized_is_propagated() {
        let storage = InMemoryMetricsStorage::new();
        storage.inc_counter("c").unwrap();
        let recorder = CapturingRecorder {
            failing: Some(Error::Unauthorized),
            ..CapturingRecorder::default()
        };

        assert!(matches!(
            flush_counters(&storage, &recorder, &metadata()),
            Err(Error::Unauthorized)
        ));
    }

    #[test]
    fn metrics_are_flushed() {
        let storage = InMemoryMetricsStorage::new();
        storage.put_gauge("g1", 3.345).unwrap();
        storage.inc_counter("count1").unwrap();
        storage.inc_latency("m1", 13).unwrap();
        let recorder = CapturingRecorder::default();

        flush_gauges(&storage, &recorder, &metadata()).unwrap();
        flush_counters(&storage, &recorder, &metadata()).unwrap();
        flush_latencies(&storage, &recorder, &metadata()).unwrap();
        // Nothing left: no empty batches are sent.
        flush_gauges(&storage, &recorder, &metadata()).unwrap();

        assert_eq!(recorder.gauges.lock().unwrap().len(), 1);
        assert_eq!(recorder.gauges.lock().unwrap()[0]["g1"], 3.345);
        assert_eq!(recorder.counters.lock().unwrap()[0]["count1"], 1);
        assert_eq!(recorder.latencies.lock().unwrap()[0]["m1"][&13], 1);
    }
}
