//! Rule evaluation: resolve a split's conditions for a key into a treatment.
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    bucketing::{needs_bucket, select_partition},
    matchers::MatchContext,
    models::{ChangeNumber, ConditionType, Split, CONTROL},
    storage::{SegmentStorage, SplitStorage},
    Attributes, Result,
};

/// Reasons reported alongside a treatment.
pub mod labels {
    /// Split is killed, default treatment served.
    pub const KILLED: &str = "killed";
    /// Split is not in storage.
    pub const DEFINITION_NOT_FOUND: &str = "definition not found";
    /// No condition matched.
    pub const DEFAULT_RULE: &str = "default rule";
    /// Key fell outside the split's traffic allocation.
    pub const NOT_IN_SPLIT: &str = "not in split";
    /// Evaluation failed (storage error or internal fault).
    pub const EXCEPTION: &str = "exception";
    /// Matching condition's partitions do not cover the key's bucket.
    pub const NO_TREATMENT_FOR_BUCKET: &str = "no treatment for bucket";
    /// Caller-supplied key is malformed.
    pub const INVALID_KEY: &str = "invalid key";
    /// Split uses a matcher this SDK does not implement.
    pub const UNSUPPORTED_MATCHER: &str = "targeting rule type unsupported by sdk";
}

/// Result of evaluating a split for a key.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    /// Treatment to serve, or [`CONTROL`].
    pub treatment: String,
    /// Why the treatment was chosen.
    pub label: String,
    /// Change number of the evaluated split. `None` if the split was not found.
    pub split_change_number: Option<ChangeNumber>,
    /// Time spent evaluating.
    pub evaluation_time: Duration,
}

impl EvaluationResult {
    /// CONTROL result with the given label.
    pub fn control(label: &str) -> EvaluationResult {
        EvaluationResult {
            treatment: CONTROL.to_owned(),
            label: label.to_owned(),
            split_change_number: None,
            evaluation_time: Duration::ZERO,
        }
    }
}

/// Treatment decision before timing is attached.
#[derive(Debug)]
pub(crate) struct Decision {
    pub treatment: String,
    pub label: String,
    pub change_number: Option<ChangeNumber>,
}

impl Decision {
    fn new(treatment: &str, label: &str, change_number: Option<ChangeNumber>) -> Decision {
        Decision {
            treatment: treatment.to_owned(),
            label: label.to_owned(),
            change_number,
        }
    }
}

/// Evaluates splits read from storage.
pub struct Evaluator {
    splits: Arc<dyn SplitStorage>,
    segments: Arc<dyn SegmentStorage>,
}

impl Evaluator {
    /// Create an evaluator reading from the given storages.
    pub fn new(splits: Arc<dyn SplitStorage>, segments: Arc<dyn SegmentStorage>) -> Evaluator {
        Evaluator { splits, segments }
    }

    pub(crate) fn segments(&self) -> &dyn SegmentStorage {
        self.segments.as_ref()
    }

    /// Evaluate `split_name` for a key.
    ///
    /// Never fails: storage errors produce CONTROL with the [`labels::EXCEPTION`] label.
    pub fn evaluate(
        &self,
        matching_key: &str,
        bucketing_key: &str,
        split_name: &str,
        attributes: &Attributes,
    ) -> EvaluationResult {
        let start = Instant::now();
        let decision = self
            .resolve(matching_key, bucketing_key, split_name, attributes, &[])
            .unwrap_or_else(|err| {
                log::warn!(target: "splitio", split_name; "failed to evaluate split: {err}");
                Decision::new(CONTROL, labels::EXCEPTION, None)
            });

        log::trace!(target: "splitio",
            split_name,
            matching_key,
            treatment = decision.treatment.as_str(),
            label = decision.label.as_str();
            "evaluated split");

        EvaluationResult {
            treatment: decision.treatment,
            label: decision.label,
            split_change_number: decision.change_number,
            evaluation_time: start.elapsed(),
        }
    }

    /// Evaluate `split_name` on top of `chain`, the splits already being evaluated.
    pub(crate) fn resolve(
        &self,
        matching_key: &str,
        bucketing_key: &str,
        split_name: &str,
        attributes: &Attributes,
        chain: &[&str],
    ) -> Result<Decision> {
        let Some(split) = self.splits.get(split_name)? else {
            log::warn!(target: "splitio", split_name; "split definition not found");
            return Ok(Decision::new(CONTROL, labels::DEFINITION_NOT_FOUND, None));
        };

        let mut chain = chain.to_vec();
        chain.push(split_name);
        let ctx = MatchContext {
            matching_key,
            bucketing_key,
            attributes,
            evaluator: self,
            chain: &chain,
        };
        evaluate_split(&split, &ctx)
    }
}

fn evaluate_split(split: &Split, ctx: &MatchContext) -> Result<Decision> {
    let change_number = Some(split.change_number);

    if split.killed {
        return Ok(Decision::new(
            &split.default_treatment,
            labels::KILLED,
            change_number,
        ));
    }

    if split.has_unsupported_matchers() {
        return Ok(Decision::new(
            CONTROL,
            labels::UNSUPPORTED_MATCHER,
            change_number,
        ));
    }

    let mut in_rollout = false;
    for condition in &split.conditions {
        if !in_rollout && condition.condition_type == ConditionType::Rollout {
            if split.traffic_allocation < 100 {
                let bucket = split
                    .algo
                    .bucket(ctx.bucketing_key, split.traffic_allocation_seed);
                if bucket > split.traffic_allocation {
                    return Ok(Decision::new(
                        &split.default_treatment,
                        labels::NOT_IN_SPLIT,
                        change_number,
                    ));
                }
            }
            in_rollout = true;
        }

        if !condition.matcher_group.matches(ctx)? {
            continue;
        }

        let bucket = if needs_bucket(&condition.partitions) {
            split.algo.bucket(ctx.bucketing_key, split.seed)
        } else {
            1
        };
        return Ok(match select_partition(&condition.partitions, bucket) {
            Some(partition) => Decision::new(&partition.treatment, &condition.label, change_number),
            None => Decision::new(
                &split.default_treatment,
                labels::NO_TREATMENT_FOR_BUCKET,
                change_number,
            ),
        });
    }

    Ok(Decision::new(
        &split.default_treatment,
        labels::DEFAULT_RULE,
        change_number,
    ))
}
