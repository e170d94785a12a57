use std::{collections::HashMap, sync::Mutex};

use crate::{storage::MetricsStorage, Result};

/// In-process telemetry aggregator. Each pop swaps the map out under its lock, so samples recorded
/// concurrently land either in the popped batch or in the next one.
#[derive(Debug, Default)]
pub struct InMemoryMetricsStorage {
    gauges: Mutex<HashMap<String, f64>>,
    counters: Mutex<HashMap<String, i64>>,
    latencies: Mutex<HashMap<String, HashMap<usize, i64>>>,
}

impl InMemoryMetricsStorage {
    /// Create an empty aggregator.
    pub fn new() -> InMemoryMetricsStorage {
        InMemoryMetricsStorage::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .expect("thread holding metrics lock should not panic")
}

impl MetricsStorage for InMemoryMetricsStorage {
    fn put_gauge(&self, name: &str, value: f64) -> Result<()> {
        lock(&self.gauges).insert(name.to_owned(), value);
        Ok(())
    }

    fn pop_gauges(&self) -> Result<HashMap<String, f64>> {
        Ok(std::mem::take(&mut *lock(&self.gauges)))
    }

    fn inc_counter(&self, name: &str) -> Result<()> {
        *lock(&self.counters).entry(name.to_owned()).or_default() += 1;
        Ok(())
    }

    fn pop_counters(&self) -> Result<HashMap<String, i64>> {
        Ok(std::mem::take(&mut *lock(&self.counters)))
    }

    fn inc_latency(&self, name: &str, bucket: usize) -> Result<()> {
        *lock(&self.latencies)
            .entry(name.to_owned())
            .or_default()
            .entry(bucket)
            .or_default() += 1;
        Ok(())
    }

    fn pop_latencies(&self) -> Result<HashMap<String, HashMap<usize, i64>>> {
        Ok(std::mem::take(&mut *lock(&self.latencies)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::InMemoryMetricsStorage;
    use crate::storage::{test_support::check_concurrent_pops, MetricsStorage};

    #[test]
    fn gauges_last_write_wins() {
        let storage = InMemoryMetricsStorage::new();
        storage.put_gauge("g1", 1.0).unwrap();
        storage.put_gauge("g1", 3.345).unwrap();
        storage.put_gauge("g2", 4.456).unwrap();

        let gauges = storage.pop_gauges().unwrap();
        assert_eq!(gauges, HashMap::from([("g1".into(), 3.345), ("g2".into(), 4.456)]));
        assert!(storage.pop_gauges().unwrap().is_empty());
    }

    #[test]
    fn counters_accumulate_until_popped() {
        let storage = InMemoryMetricsStorage::new();
        for _ in 0..3 {
            storage.inc_counter("count1").unwrap();
        }
        for _ in 0..6 {
            storage.inc_counter("count2").unwrap();
        }
        let counters = storage.pop_counters().unwrap();
        assert_eq!(counters["count1"], 3);
        assert_eq!(counters["count2"], 6);
        assert!(storage.pop_counters().unwrap().is_empty());
    }

    #[test]
    fn latencies_form_histograms() {
        let storage = InMemoryMetricsStorage::new();
        for bucket in [13, 13, 13, 1, 1] {
            storage.inc_latency("m1", bucket).unwrap();
        }
        let latencies = storage.pop_latencies().unwrap();
        assert_eq!(latencies["m1"], HashMap::from([(13, 3), (1, 2)]));
        assert!(storage.pop_latencies().unwrap().is_empty());
    }

    #[test]
    fn pops_race_with_increments() {
        check_concurrent_pops(&InMemoryMetricsStorage::new());
    }
}
