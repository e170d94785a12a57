use std::collections::HashMap;

use crate::{
    storage::{shared::PrefixedClient, MetricsStorage},
    Result, SdkMetadata,
};

const GAUGE: &str = "gauge.";
const COUNTER: &str = "count.";
const LATENCY: &str = "latency.";
const BUCKET: &str = ".bucket.";

/// Telemetry aggregator kept in a shared backend, one key per metric (and latency bucket) under a
/// per-instance path `SPLITIO/<sdk version>/<machine name>/`.
///
/// Pops read and delete every key in one backend operation, so samples are neither lost nor
/// reported twice when several processes pop concurrently.
pub struct SharedMetricsStorage {
    client: PrefixedClient,
    base: String,
}

impl SharedMetricsStorage {
    /// Create metrics storage for the SDK instance described by `metadata`.
    pub fn new(client: PrefixedClient, metadata: &SdkMetadata) -> SharedMetricsStorage {
        SharedMetricsStorage {
            client,
            base: format!(
                "SPLITIO/{}/{}/",
                metadata.sdk_version, metadata.machine_name
            ),
        }
    }

    fn key(&self, kind: &str, name: &str) -> String {
        format!("{}{kind}{name}", self.base)
    }

    /// Take every key of `kind`, returning `(name, raw value)` pairs.
    fn take_all(&self, kind: &str) -> Result<Vec<(String, String)>> {
        let prefix = self.key(kind, "");
        let mut taken = Vec::new();
        for key in self.client.keys(&prefix)? {
            if let Some(value) = self.client.take(&key)? {
                let name = key[prefix.len()..].to_owned();
                taken.push((name, value));
            }
        }
        Ok(taken)
    }
}

fn parse<T: std::str::FromStr>(name: &str, value: &str) -> Option<T> {
    let parsed = value.parse().ok();
    if parsed.is_none() {
        log::warn!(target: "splitio", metric = name; "dropping malformed metric value {value:?}");
    }
    parsed
}

impl MetricsStorage for SharedMetricsStorage {
    fn put_gauge(&self, name: &str, value: f64) -> Result<()> {
        self.client.set(&self.key(GAUGE, name), &value.to_string())
    }

    fn pop_gauges(&self) -> Result<HashMap<String, f64>> {
        Ok(self
            .take_all(GAUGE)?
            .into_iter()
            .filter_map(|(name, value)| parse(&name, &value).map(|parsed| (name, parsed)))
            .collect())
    }

    fn inc_counter(&self, name: &str) -> Result<()> {
        self.client.incr_by(&self.key(COUNTER, name), 1)?;
        Ok(())
    }

    fn pop_counters(&self) -> Result<HashMap<String, i64>> {
        Ok(self
            .take_all(COUNTER)?
            .into_iter()
            .filter_map(|(name, value)| parse(&name, &value).map(|parsed| (name, parsed)))
            .collect())
    }

    fn inc_latency(&self, name: &str, bucket: usize) -> Result<()> {
        let key = self.key(LATENCY, &format!("{name}{BUCKET}{bucket}"));
        self.client.incr_by(&key, 1)?;
        Ok(())
    }

    fn pop_latencies(&self) -> Result<HashMap<String, HashMap<usize, i64>>> {
        let mut latencies: HashMap<String, HashMap<usize, i64>> = HashMap::new();
        for (key, value) in self.take_all(LATENCY)? {
            let Some((name, bucket)) = key.rsplit_once(BUCKET) else {
                log::warn!(target: "splitio", metric = key.as_str(); "dropping latency without bucket");
                continue;
            };
            let (Some(bucket), Some(count)) =
                (parse::<usize>(name, bucket), parse::<i64>(name, &value))
            else {
                continue;
            };
            *latencies
                .entry(name.to_owned())
                .or_default()
                .entry(bucket)
                .or_default() += count;
        }
        Ok(latencies)
    }
}
