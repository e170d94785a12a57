use std::{borrow::Cow, cmp::Ordering, collections::BTreeSet};

use chrono::{DateTime, DurationRound, TimeDelta};
use semver::Version;

use crate::{
    evaluator::Evaluator,
    models::{DataType, Matcher, MatcherGroup, MatcherKind},
    AttributeValue, Attributes, Result,
};

/// Longest chain of splits depending on each other that is still evaluated.
pub(crate) const MAX_DEPENDENCY_DEPTH: usize = 10;

/// Everything a matcher may look at.
pub(crate) struct MatchContext<'a> {
    pub matching_key: &'a str,
    pub bucketing_key: &'a str,
    pub attributes: &'a Attributes,
    pub evaluator: &'a Evaluator,
    /// Splits currently being evaluated, outermost first.
    pub chain: &'a [&'a str],
}

impl MatcherGroup {
    /// AND of all matchers, short-circuiting on the first miss.
    pub(crate) fn matches(&self, ctx: &MatchContext) -> Result<bool> {
        for matcher in &self.matchers {
            if !matcher.matches(ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Matcher {
    /// Evaluate the matcher. A missing or mistyped value counts as "no match" before negation.
    ///
    /// Errors only come from storage lookups.
    pub(crate) fn matches(&self, ctx: &MatchContext) -> Result<bool> {
        let matched = match self.subject(ctx) {
            Some(value) => self.kind.try_eval(&value, ctx)?.unwrap_or(false),
            None => false,
        };
        Ok(matched != self.negate)
    }

    fn subject<'a>(&self, ctx: &MatchContext<'a>) -> Option<Cow<'a, AttributeValue>> {
        match &self.attribute {
            Some(attribute) => ctx.attributes.get(attribute).map(Cow::Borrowed),
            None => Some(Cow::Owned(AttributeValue::String(
                ctx.matching_key.to_owned(),
            ))),
        }
    }
}

impl MatcherKind {
    /// Try applying the matcher to `value`, returning `None` if it cannot be applied.
    fn try_eval(&self, value: &AttributeValue, ctx: &MatchContext) -> Result<Option<bool>> {
        let result = match self {
            Self::AllKeys => Some(true),

            Self::InSegment { segment_name } => match value.as_str() {
                Some(key) => Some(ctx.evaluator.segments().contains_key(segment_name, key)?),
                None => None,
            },

            Self::Whitelist(keys) => value.as_str().map(|s| keys.contains(s)),

            Self::EqualTo { data_type, value: expected } => {
                let day = *data_type == DataType::Datetime;
                compare(value, *data_type, day, |v, truncate| v == truncate(*expected))
            }
            Self::GreaterThanOrEqualTo { data_type, value: expected } => {
                compare(value, *data_type, false, |v, truncate| v >= truncate(*expected))
            }
            Self::LessThanOrEqualTo { data_type, value: expected } => {
                compare(value, *data_type, false, |v, truncate| v <= truncate(*expected))
            }
            Self::Between {
                data_type,
                start,
                end,
            } => compare(value, *data_type, false, |v, truncate| {
                truncate(*start) <= v && v <= truncate(*end)
            }),

            Self::EqualToSet(expected) => value
                .as_list()
                .map(|list| &list.iter().cloned().collect::<BTreeSet<_>>() == expected),
            Self::ContainsAnyOfSet(expected) => value
                .as_list()
                .map(|list| list.iter().any(|item| expected.contains(item))),
            Self::ContainsAllOfSet(expected) => value.as_list().map(|list| {
                let list = list.iter().collect::<BTreeSet<_>>();
                expected.iter().all(|item| list.contains(&item))
            }),
            Self::PartOfSet(expected) => value.as_list().map(|list| {
                !list.is_empty() && list.iter().all(|item| expected.contains(item))
            }),

            Self::StartsWith(prefixes) => value
                .as_str()
                .map(|s| prefixes.iter().any(|prefix| s.starts_with(prefix.as_str()))),
            Self::EndsWith(suffixes) => value
                .as_str()
                .map(|s| suffixes.iter().any(|suffix| s.ends_with(suffix.as_str()))),
            Self::ContainsString(needles) => value
                .as_str()
                .map(|s| needles.iter().any(|needle| s.contains(needle.as_str()))),
            Self::MatchesString(pattern) => value.as_str().map(|s| pattern.is_match(s)),

            Self::EqualToBoolean(expected) => value.as_boolean().map(|b| b == *expected),

            Self::InSplitTreatment { split, treatments } => {
                eval_dependency(split, treatments, ctx)?
            }

            Self::EqualToSemver(expected) => {
                semver(value).map(|v| precedence(&v, expected) == Ordering::Equal)
            }
            Self::GreaterThanOrEqualToSemver(expected) => {
                semver(value).map(|v| precedence(&v, expected) != Ordering::Less)
            }
            Self::LessThanOrEqualToSemver(expected) => {
                semver(value).map(|v| precedence(&v, expected) != Ordering::Greater)
            }
            Self::BetweenSemver { start, end } => semver(value).map(|v| {
                precedence(&v, start) != Ordering::Less
                    && precedence(&v, end) != Ordering::Greater
            }),
            Self::InListSemver(versions) => semver(value).map(|v| {
                versions
                    .iter()
                    .any(|version| precedence(&v, version) == Ordering::Equal)
            }),

            Self::Unsupported { .. } => None,
        };
        Ok(result)
    }
}

/// Compare an integer (or date) attribute. `op` receives the attribute value and a function
/// that brings the matcher's operands to the same precision.
fn compare(
    value: &AttributeValue,
    data_type: DataType,
    truncate_to_day: bool,
    op: impl Fn(i64, &dyn Fn(i64) -> i64) -> bool,
) -> Option<bool> {
    let value = value.as_integer()?;
    match data_type {
        DataType::Number => Some(op(value, &|v| v)),
        DataType::Datetime => {
            let precision = if truncate_to_day {
                TimeDelta::days(1)
            } else {
                TimeDelta::minutes(1)
            };
            let truncate = |millis: i64| {
                DateTime::from_timestamp_millis(millis)
                    .and_then(|date| date.duration_trunc(precision).ok())
                    .map_or(millis, |date| date.timestamp_millis())
            };
            Some(op(truncate(value), &truncate))
        }
    }
}

/// Semver precedence: build metadata is ignored.
fn precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch, &a.pre).cmp(&(b.major, b.minor, b.patch, &b.pre))
}

fn semver(value: &AttributeValue) -> Option<Version> {
    Version::parse(value.as_str()?).ok()
}

fn eval_dependency(
    split: &str,
    treatments: &[String],
    ctx: &MatchContext,
) -> Result<Option<bool>> {
    if ctx.chain.contains(&split) {
        log::warn!(target: "splitio", split_name = split; "circular split dependency, treating as no match");
        return Ok(None);
    }
    if ctx.chain.len() >= MAX_DEPENDENCY_DEPTH {
        log::warn!(target: "splitio", split_name = split; "split dependency chain is too deep, treating as no match");
        return Ok(None);
    }
    let decision = ctx.evaluator.resolve(
        ctx.matching_key,
        ctx.bucketing_key,
        split,
        ctx.attributes,
        ctx.chain,
    )?;
    Ok(Some(treatments.contains(&decision.treatment)))
}
