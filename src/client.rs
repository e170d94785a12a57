use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    time::Instant,
};

use crate::{
    evaluator::{labels, EvaluationResult, Evaluator},
    impression_listener::{ImpressionListener, NoopImpressionListener},
    latency,
    storage::{Impression, ImpressionStorage, MetricsStorage, NO_CHANGE_NUMBER},
    Attributes, Key,
};

/// Latency metric recorded for every treatment lookup.
pub const TREATMENT_LATENCY_METRIC: &str = "sdk.getTreatment";

/// Entry point for evaluating treatments.
///
/// Every call resolves the key, evaluates the split, records an impression and a latency sample.
/// No call ever fails or panics: any problem is logged and CONTROL is returned.
pub struct SplitClient {
    evaluator: Arc<Evaluator>,
    impressions: Arc<dyn ImpressionStorage>,
    metrics: Arc<dyn MetricsStorage>,
    listener: Box<dyn ImpressionListener + Send + Sync>,
    labels_enabled: bool,
}

impl SplitClient {
    /// Create a client recording telemetry into the given storages.
    pub fn new(
        evaluator: Arc<Evaluator>,
        impressions: Arc<dyn ImpressionStorage>,
        metrics: Arc<dyn MetricsStorage>,
    ) -> SplitClient {
        SplitClient {
            evaluator,
            impressions,
            metrics,
            listener: Box::new(NoopImpressionListener),
            labels_enabled: true,
        }
    }

    /// Notify `listener` of every recorded impression.
    pub fn with_impression_listener(
        self,
        listener: impl ImpressionListener + Send + Sync + 'static,
    ) -> SplitClient {
        self.with_boxed_listener(Box::new(listener))
    }

    pub(crate) fn with_boxed_listener(
        mut self,
        listener: Box<dyn ImpressionListener + Send + Sync>,
    ) -> SplitClient {
        self.listener = listener;
        self
    }

    /// When disabled, impressions carry an empty label.
    pub fn with_labels_enabled(mut self, labels_enabled: bool) -> SplitClient {
        self.labels_enabled = labels_enabled;
        self
    }

    /// Treatment of `feature` for `key`.
    ///
    /// # Examples
    /// ```
    /// # use std::sync::Arc;
    /// # use splitio_core::{Attributes, Evaluator, SplitClient};
    /// # use splitio_core::storage::memory::*;
    /// let evaluator = Evaluator::new(
    ///     Arc::new(InMemorySplitStorage::new()),
    ///     Arc::new(InMemorySegmentStorage::new()),
    /// );
    /// let client = SplitClient::new(
    ///     Arc::new(evaluator),
    ///     Arc::new(InMemoryImpressionStorage::new(100)),
    ///     Arc::new(InMemoryMetricsStorage::new()),
    /// );
    /// assert_eq!(client.treatment(&"user-1".into(), "missing", &Attributes::new()), "control");
    /// ```
    pub fn treatment(&self, key: &Key, feature: &str, attributes: &Attributes) -> String {
        self.evaluate(key, feature, attributes).treatment
    }

    /// Treatments of several features for the same key.
    pub fn treatments(
        &self,
        key: &Key,
        features: &[&str],
        attributes: &Attributes,
    ) -> HashMap<String, String> {
        features
            .iter()
            .map(|&feature| (feature.to_owned(), self.treatment(key, feature, attributes)))
            .collect()
    }

    /// Full evaluation result of `feature` for `key`.
    pub fn evaluate(&self, key: &Key, feature: &str, attributes: &Attributes) -> EvaluationResult {
        let start = Instant::now();

        let Ok((matching_key, bucketing_key)) = key.resolve() else {
            // Malformed keys are logged by `resolve` and never produce an impression.
            return EvaluationResult::control(labels::INVALID_KEY);
        };

        let result = catch_unwind(AssertUnwindSafe(|| {
            self.evaluator
                .evaluate(matching_key, bucketing_key, feature, attributes)
        }))
        .unwrap_or_else(|_| {
            log::error!(target: "splitio", feature, matching_key; "panic while evaluating split, serving control");
            EvaluationResult::control(labels::EXCEPTION)
        });

        let impression = Impression {
            key_name: matching_key.to_owned(),
            bucketing_key: bucketing_key.to_owned(),
            feature_name: feature.to_owned(),
            treatment: result.treatment.clone(),
            label: if self.labels_enabled {
                result.label.clone()
            } else {
                String::new()
            },
            change_number: result.split_change_number.unwrap_or(NO_CHANGE_NUMBER),
            time: chrono::Utc::now().timestamp_millis(),
        };
        self.record(impression, attributes);

        let bucket = latency::bucket(start.elapsed());
        if let Err(err) = self.metrics.inc_latency(TREATMENT_LATENCY_METRIC, bucket) {
            log::warn!(target: "splitio", feature; "failed to record latency: {err}");
        }

        result
    }

    fn record(&self, impression: Impression, attributes: &Attributes) {
        if let Err(err) = self
            .impressions
            .log_impressions(std::slice::from_ref(&impression))
        {
            log::warn!(target: "splitio", feature = impression.feature_name.as_str(); "failed to record impression: {err}");
        }

        let notified = catch_unwind(AssertUnwindSafe(|| {
            self.listener.log_impression(&impression, attributes)
        }));
        if notified.is_err() {
            log::error!(target: "splitio", feature = impression.feature_name.as_str(); "impression listener panicked");
        }
    }
}
