//! Split and segment definitions as produced by the control plane.
//!
//! Definitions are plain immutable values. Storage replaces a split wholesale on every update.
use std::collections::BTreeSet;

use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};

/// Version stamp of a split or segment. Monotonically increasing per entity.
pub type ChangeNumber = i64;

/// Treatment returned when no decision could be made.
pub const CONTROL: &str = "control";

/// A named feature flag with ordered targeting rules and a default treatment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Split {
    pub name: String,
    #[serde(default)]
    pub traffic_type_name: String,
    #[serde(default)]
    pub killed: bool,
    #[serde(default)]
    pub status: SplitStatus,
    #[serde(default = "default_treatment")]
    pub default_treatment: String,
    #[serde(default)]
    pub change_number: ChangeNumber,
    /// Seed used to bucket keys into partitions.
    #[serde(default)]
    pub seed: i64,
    /// Percentage (0-100) of traffic that enters rollout conditions.
    #[serde(default = "default_traffic_allocation")]
    pub traffic_allocation: u32,
    #[serde(default)]
    pub traffic_allocation_seed: i64,
    #[serde(default)]
    pub algo: HashAlgorithm,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

fn default_treatment() -> String {
    CONTROL.to_owned()
}

fn default_traffic_allocation() -> u32 {
    100
}

impl Default for Split {
    fn default() -> Split {
        Split {
            name: String::new(),
            traffic_type_name: String::new(),
            killed: false,
            status: SplitStatus::default(),
            default_treatment: default_treatment(),
            change_number: 0,
            seed: 0,
            traffic_allocation: default_traffic_allocation(),
            traffic_allocation_seed: 0,
            algo: HashAlgorithm::default(),
            conditions: Vec::new(),
        }
    }
}

impl Split {
    /// Names of all segments referenced by this split's matchers.
    pub fn segment_names(&self) -> impl Iterator<Item = &str> {
        self.matchers().filter_map(|matcher| match &matcher.kind {
            MatcherKind::InSegment { segment_name } => Some(segment_name.as_str()),
            _ => None,
        })
    }

    pub(crate) fn has_unsupported_matchers(&self) -> bool {
        self.matchers()
            .any(|matcher| matches!(matcher.kind, MatcherKind::Unsupported { .. }))
    }

    fn matchers(&self) -> impl Iterator<Item = &Matcher> {
        self.conditions
            .iter()
            .flat_map(|condition| condition.matcher_group.matchers.iter())
    }
}

/// Lifecycle status of a split. Archived splits are removed from storage on sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum SplitStatus {
    #[default]
    Active,
    Archived,
}

/// Hash function used to compute buckets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<u8>", into = "u8")]
pub enum HashAlgorithm {
    /// Java-style `31 * h + c` string hash. Used when `algo` is absent.
    #[default]
    Legacy,
    /// 32-bit murmur3.
    Murmur3,
}

impl From<Option<u8>> for HashAlgorithm {
    fn from(value: Option<u8>) -> HashAlgorithm {
        match value {
            Some(2) => HashAlgorithm::Murmur3,
            _ => HashAlgorithm::Legacy,
        }
    }
}

impl From<HashAlgorithm> for u8 {
    fn from(value: HashAlgorithm) -> u8 {
        match value {
            HashAlgorithm::Legacy => 1,
            HashAlgorithm::Murmur3 => 2,
        }
    }
}

/// An ordered targeting rule: a group of matchers paired with a partition table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Condition {
    #[serde(default)]
    pub condition_type: ConditionType,
    pub matcher_group: MatcherGroup,
    #[serde(default)]
    pub partitions: Vec<Partition>,
    /// Reported as the impression label when this condition matches.
    #[serde(default)]
    pub label: String,
}

/// Whitelist conditions are evaluated before the traffic allocation check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum ConditionType {
    Whitelist,
    #[default]
    Rollout,
}

/// Logical AND of matchers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct MatcherGroup {
    #[serde(default)]
    pub combiner: Combiner,
    pub matchers: Vec<Matcher>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum Combiner {
    #[default]
    And,
}

/// Treatment and its share (0-100) of the condition's traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Partition {
    pub treatment: String,
    pub size: u32,
}

/// Selects what a matcher is applied to: the matching key (no attribute) or a named attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct KeySelector {
    #[serde(default)]
    pub traffic_type: Option<String>,
    #[serde(default)]
    pub attribute: Option<String>,
}

/// A single targeting predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MatcherWire", into = "MatcherWire")]
pub struct Matcher {
    /// Attribute the matcher reads. `None` means the matching key.
    pub attribute: Option<String>,
    /// Invert the result.
    pub negate: bool,
    /// Predicate kind and its parameters.
    pub kind: MatcherKind,
}

impl Matcher {
    /// Create a non-negated matcher over the matching key.
    pub fn new(kind: MatcherKind) -> Matcher {
        Matcher {
            attribute: None,
            negate: false,
            kind,
        }
    }

    /// Read `attribute` instead of the matching key.
    pub fn on_attribute(mut self, attribute: impl Into<String>) -> Matcher {
        self.attribute = Some(attribute.into());
        self
    }

    /// Invert the matcher.
    pub fn negated(mut self) -> Matcher {
        self.negate = true;
        self
    }
}

/// Interpretation of integer operands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    /// Plain integer.
    #[default]
    Number,
    /// Milliseconds since Unix epoch.
    Datetime,
}

/// Regular expression compiled when the split is loaded. Two patterns are equal when their source
/// text is.
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    /// Compile `pattern`.
    pub fn new(pattern: &str) -> Result<Pattern, regex::Error> {
        Regex::new(pattern).map(Pattern)
    }

    /// Source text of the pattern.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Whether the pattern matches anywhere in `haystack`.
    pub fn is_match(&self, haystack: &str) -> bool {
        self.0.is_match(haystack)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Pattern) -> bool {
        self.as_str() == other.as_str()
    }
}

/// Closed set of matcher kinds.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum MatcherKind {
    AllKeys,
    InSegment {
        segment_name: String,
    },
    Whitelist(BTreeSet<String>),
    EqualTo {
        data_type: DataType,
        value: i64,
    },
    GreaterThanOrEqualTo {
        data_type: DataType,
        value: i64,
    },
    LessThanOrEqualTo {
        data_type: DataType,
        value: i64,
    },
    Between {
        data_type: DataType,
        start: i64,
        end: i64,
    },
    EqualToSet(BTreeSet<String>),
    ContainsAnyOfSet(BTreeSet<String>),
    ContainsAllOfSet(BTreeSet<String>),
    PartOfSet(BTreeSet<String>),
    StartsWith(Vec<String>),
    EndsWith(Vec<String>),
    ContainsString(Vec<String>),
    MatchesString(Pattern),
    EqualToBoolean(bool),
    /// Matches when evaluating `split` for the same key yields one of `treatments`.
    InSplitTreatment {
        split: String,
        treatments: Vec<String>,
    },
    EqualToSemver(Version),
    GreaterThanOrEqualToSemver(Version),
    LessThanOrEqualToSemver(Version),
    BetweenSemver {
        start: Version,
        end: Version,
    },
    InListSemver(Vec<Version>),
    /// Matcher type this SDK does not know about. Never matches.
    Unsupported {
        matcher_type: String,
    },
}

/// Wire representation of a matcher: a type tag plus one populated data field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatcherWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key_selector: Option<KeySelector>,
    matcher_type: String,
    #[serde(default)]
    negate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_defined_segment_matcher_data: Option<SegmentMatcherData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    whitelist_matcher_data: Option<WhitelistMatcherData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unary_numeric_matcher_data: Option<UnaryNumericMatcherData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    between_matcher_data: Option<BetweenMatcherData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    boolean_matcher_data: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dependency_matcher_data: Option<DependencyMatcherData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    string_matcher_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    between_string_matcher_data: Option<BetweenStringMatcherData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SegmentMatcherData {
    segment_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WhitelistMatcherData {
    whitelist: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnaryNumericMatcherData {
    #[serde(default)]
    data_type: Option<DataType>,
    value: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BetweenMatcherData {
    #[serde(default)]
    data_type: Option<DataType>,
    start: i64,
    end: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DependencyMatcherData {
    split: String,
    treatments: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BetweenStringMatcherData {
    start: String,
    end: String,
}

/// A matcher whose type is known but whose data is missing or malformed.
#[derive(Debug, thiserror::Error)]
#[error("invalid {matcher_type} matcher: {reason}")]
pub struct InvalidMatcher {
    matcher_type: String,
    reason: &'static str,
}

impl TryFrom<MatcherWire> for Matcher {
    type Error = InvalidMatcher;

    fn try_from(wire: MatcherWire) -> Result<Matcher, InvalidMatcher> {
        let invalid = |reason| InvalidMatcher {
            matcher_type: wire.matcher_type.clone(),
            reason,
        };
        let whitelist = || {
            wire.whitelist_matcher_data
                .as_ref()
                .map(|data| data.whitelist.clone())
                .ok_or_else(|| invalid("missing whitelistMatcherData"))
        };
        let unary = || {
            wire.unary_numeric_matcher_data
                .as_ref()
                .map(|data| (data.data_type.unwrap_or_default(), data.value))
                .ok_or_else(|| invalid("missing unaryNumericMatcherData"))
        };
        let string = || {
            wire.string_matcher_data
                .clone()
                .ok_or_else(|| invalid("missing stringMatcherData"))
        };
        let semver = |s: &str| Version::parse(s).map_err(|_| invalid("invalid semantic version"));
        let pattern =
            |s: &str| Pattern::new(s).map_err(|_| invalid("invalid regular expression"));

        let kind = match wire.matcher_type.as_str() {
            "ALL_KEYS" => MatcherKind::AllKeys,
            "IN_SEGMENT" => MatcherKind::InSegment {
                segment_name: wire
                    .user_defined_segment_matcher_data
                    .as_ref()
                    .map(|data| data.segment_name.clone())
                    .ok_or_else(|| invalid("missing userDefinedSegmentMatcherData"))?,
            },
            "WHITELIST" => MatcherKind::Whitelist(whitelist()?.into_iter().collect()),
            "EQUAL_TO" => {
                let (data_type, value) = unary()?;
                MatcherKind::EqualTo { data_type, value }
            }
            "GREATER_THAN_OR_EQUAL_TO" => {
                let (data_type, value) = unary()?;
                MatcherKind::GreaterThanOrEqualTo { data_type, value }
            }
            "LESS_THAN_OR_EQUAL_TO" => {
                let (data_type, value) = unary()?;
                MatcherKind::LessThanOrEqualTo { data_type, value }
            }
            "BETWEEN" => {
                let data = wire
                    .between_matcher_data
                    .as_ref()
                    .ok_or_else(|| invalid("missing betweenMatcherData"))?;
                MatcherKind::Between {
                    data_type: data.data_type.unwrap_or_default(),
                    start: data.start,
                    end: data.end,
                }
            }
            "EQUAL_TO_SET" => MatcherKind::EqualToSet(whitelist()?.into_iter().collect()),
            "CONTAINS_ANY_OF_SET" => {
                MatcherKind::ContainsAnyOfSet(whitelist()?.into_iter().collect())
            }
            "CONTAINS_ALL_OF_SET" => {
                MatcherKind::ContainsAllOfSet(whitelist()?.into_iter().collect())
            }
            "PART_OF_SET" => MatcherKind::PartOfSet(whitelist()?.into_iter().collect()),
            "STARTS_WITH" => MatcherKind::StartsWith(whitelist()?),
            "ENDS_WITH" => MatcherKind::EndsWith(whitelist()?),
            "CONTAINS_STRING" => MatcherKind::ContainsString(whitelist()?),
            "MATCHES_STRING" => MatcherKind::MatchesString(pattern(&string()?)?),
            "EQUAL_TO_BOOLEAN" => MatcherKind::EqualToBoolean(
                wire.boolean_matcher_data
                    .ok_or_else(|| invalid("missing booleanMatcherData"))?,
            ),
            "IN_SPLIT_TREATMENT" => {
                let data = wire
                    .dependency_matcher_data
                    .as_ref()
                    .ok_or_else(|| invalid("missing dependencyMatcherData"))?;
                MatcherKind::InSplitTreatment {
                    split: data.split.clone(),
                    treatments: data.treatments.clone(),
                }
            }
            "EQUAL_TO_SEMVER" => MatcherKind::EqualToSemver(semver(&string()?)?),
            "GREATER_THAN_OR_EQUAL_TO_SEMVER" => {
                MatcherKind::GreaterThanOrEqualToSemver(semver(&string()?)?)
            }
            "LESS_THAN_OR_EQUAL_TO_SEMVER" => {
                MatcherKind::LessThanOrEqualToSemver(semver(&string()?)?)
            }
            "BETWEEN_SEMVER" => {
                let data = wire
                    .between_string_matcher_data
                    .as_ref()
                    .ok_or_else(|| invalid("missing betweenStringMatcherData"))?;
                MatcherKind::BetweenSemver {
                    start: semver(&data.start)?,
                    end: semver(&data.end)?,
                }
            }
            "IN_LIST_SEMVER" => MatcherKind::InListSemver(
                whitelist()?
                    .iter()
                    .map(|s| semver(s))
                    .collect::<Result<_, _>>()?,
            ),
            other => {
                log::debug!(target: "splitio", matcher_type = other; "unsupported matcher type");
                MatcherKind::Unsupported {
                    matcher_type: other.to_owned(),
                }
            }
        };

        Ok(Matcher {
            attribute: wire.key_selector.and_then(|selector| selector.attribute),
            negate: wire.negate,
            kind,
        })
    }
}

impl From<Matcher> for MatcherWire {
    fn from(matcher: Matcher) -> MatcherWire {
        let mut wire = MatcherWire {
            key_selector: matcher.attribute.map(|attribute| KeySelector {
                traffic_type: None,
                attribute: Some(attribute),
            }),
            negate: matcher.negate,
            ..MatcherWire::default()
        };
        let whitelist =
            |values: Vec<String>| Some(WhitelistMatcherData { whitelist: values });
        let unary = |data_type, value| {
            Some(UnaryNumericMatcherData {
                data_type: Some(data_type),
                value,
            })
        };

        let matcher_type = match matcher.kind {
            MatcherKind::AllKeys => "ALL_KEYS",
            MatcherKind::InSegment { segment_name } => {
                wire.user_defined_segment_matcher_data = Some(SegmentMatcherData { segment_name });
                "IN_SEGMENT"
            }
            MatcherKind::Whitelist(keys) => {
                wire.whitelist_matcher_data = whitelist(keys.into_iter().collect());
                "WHITELIST"
            }
            MatcherKind::EqualTo { data_type, value } => {
                wire.unary_numeric_matcher_data = unary(data_type, value);
                "EQUAL_TO"
            }
            MatcherKind::GreaterThanOrEqualTo { data_type, value } => {
                wire.unary_numeric_matcher_data = unary(data_type, value);
                "GREATER_THAN_OR_EQUAL_TO"
            }
            MatcherKind::LessThanOrEqualTo { data_type, value } => {
                wire.unary_numeric_matcher_data = unary(data_type, value);
                "LESS_THAN_OR_EQUAL_TO"
            }
            MatcherKind::Between {
                data_type,
                start,
                end,
            } => {
                wire.between_matcher_data = Some(BetweenMatcherData {
                    data_type: Some(data_type),
                    start,
                    end,
                });
                "BETWEEN"
            }
            MatcherKind::EqualToSet(values) => {
                wire.whitelist_matcher_data = whitelist(values.into_iter().collect());
                "EQUAL_TO_SET"
            }
            MatcherKind::ContainsAnyOfSet(values) => {
                wire.whitelist_matcher_data = whitelist(values.into_iter().collect());
                "CONTAINS_ANY_OF_SET"
            }
            MatcherKind::ContainsAllOfSet(values) => {
                wire.whitelist_matcher_data = whitelist(values.into_iter().collect());
                "CONTAINS_ALL_OF_SET"
            }
            MatcherKind::PartOfSet(values) => {
                wire.whitelist_matcher_data = whitelist(values.into_iter().collect());
                "PART_OF_SET"
            }
            MatcherKind::StartsWith(values) => {
                wire.whitelist_matcher_data = whitelist(values);
                "STARTS_WITH"
            }
            MatcherKind::EndsWith(values) => {
                wire.whitelist_matcher_data = whitelist(values);
                "ENDS_WITH"
            }
            MatcherKind::ContainsString(values) => {
                wire.whitelist_matcher_data = whitelist(values);
                "CONTAINS_STRING"
            }
            MatcherKind::MatchesString(pattern) => {
                wire.string_matcher_data = Some(pattern.as_str().to_owned());
                "MATCHES_STRING"
            }
            MatcherKind::EqualToBoolean(value) => {
                wire.boolean_matcher_data = Some(value);
                "EQUAL_TO_BOOLEAN"
            }
            MatcherKind::InSplitTreatment { split, treatments } => {
                wire.dependency_matcher_data = Some(DependencyMatcherData { split, treatments });
                "IN_SPLIT_TREATMENT"
            }
            MatcherKind::EqualToSemver(version) => {
                wire.string_matcher_data = Some(version.to_string());
                "EQUAL_TO_SEMVER"
            }
            MatcherKind::GreaterThanOrEqualToSemver(version) => {
                wire.string_matcher_data = Some(version.to_string());
                "GREATER_THAN_OR_EQUAL_TO_SEMVER"
            }
            MatcherKind::LessThanOrEqualToSemver(version) => {
                wire.string_matcher_data = Some(version.to_string());
                "LESS_THAN_OR_EQUAL_TO_SEMVER"
            }
            MatcherKind::BetweenSemver { start, end } => {
                wire.between_string_matcher_data = Some(BetweenStringMatcherData {
                    start: start.to_string(),
                    end: end.to_string(),
                });
                "BETWEEN_SEMVER"
            }
            MatcherKind::InListSemver(versions) => {
                wire.whitelist_matcher_data =
                    whitelist(versions.iter().map(ToString::to_string).collect());
                "IN_LIST_SEMVER"
            }
            MatcherKind::Unsupported { matcher_type } => {
                wire.matcher_type = matcher_type;
                return wire;
            }
        };
        wire.matcher_type = matcher_type.to_owned();
        wire
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use super::{DataType, HashAlgorithm, Matcher, MatcherKind, Split, SplitStatus};

    #[test]
    fn parse_split_fixture() {
        let f = File::open("tests/data/split_changes.json")
            .expect("Failed to open tests/data/split_changes.json");
        let changes: serde_json::Value = serde_json::from_reader(f).unwrap();
        let splits: Vec<Split> = serde_json::from_value(changes["splits"].clone()).unwrap();
        assert!(!splits.is_empty());
    }

    #[test]
    fn parse_matchers_from_wire() {
        let matcher: Matcher = serde_json::from_str(
            r#"
              {
                "keySelector": {"trafficType": "user", "attribute": "age"},
                "matcherType": "BETWEEN",
                "negate": true,
                "betweenMatcherData": {"dataType": "NUMBER", "start": 18, "end": 30}
              }
            "#,
        )
        .unwrap();
        assert_eq!(matcher.attribute.as_deref(), Some("age"));
        assert!(matcher.negate);
        assert_eq!(
            matcher.kind,
            MatcherKind::Between {
                data_type: DataType::Number,
                start: 18,
                end: 30
            }
        );
    }

    #[test]
    fn missing_matcher_data_is_an_error() {
        let result: Result<Matcher, _> =
            serde_json::from_str(r#"{"matcherType": "IN_SEGMENT", "negate": false}"#);
        assert!(result.is_err());
    }

    #[test]
    fn regular_expressions_compile_on_load() {
        let matcher: Matcher = serde_json::from_str(
            r#"{"matcherType": "MATCHES_STRING", "negate": false, "stringMatcherData": "^test.*"}"#,
        )
        .unwrap();
        let MatcherKind::MatchesString(pattern) = &matcher.kind else {
            panic!("unexpected matcher kind {:?}", matcher.kind);
        };
        assert_eq!(pattern.as_str(), "^test.*");
        assert!(pattern.is_match("test@split.io"));

        let result: Result<Matcher, _> = serde_json::from_str(
            r#"{"matcherType": "MATCHES_STRING", "negate": true, "stringMatcherData": "(unclosed"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn unknown_matcher_type_is_unsupported() {
        let matcher: Matcher =
            serde_json::from_str(r#"{"matcherType": "IN_LARGE_SEGMENT", "negate": false}"#)
                .unwrap();
        assert_eq!(
            matcher.kind,
            MatcherKind::Unsupported {
                matcher_type: "IN_LARGE_SEGMENT".to_owned()
            }
        );
    }

    #[test]
    fn split_survives_storage_serialization() {
        let json = r#"
          {
            "name": "checkout",
            "trafficTypeName": "user",
            "killed": false,
            "status": "ACTIVE",
            "defaultTreatment": "off",
            "changeNumber": 42,
            "seed": -1222652054,
            "algo": 2,
            "conditions": [{
              "conditionType": "ROLLOUT",
              "matcherGroup": {
                "combiner": "AND",
                "matchers": [{
                  "keySelector": {"trafficType": "user", "attribute": null},
                  "matcherType": "IN_SEGMENT",
                  "negate": false,
                  "userDefinedSegmentMatcherData": {"segmentName": "employees"}
                }, {
                  "keySelector": {"trafficType": "user", "attribute": "version"},
                  "matcherType": "GREATER_THAN_OR_EQUAL_TO_SEMVER",
                  "negate": false,
                  "stringMatcherData": "2.1.0"
                }]
              },
              "partitions": [{"treatment": "on", "size": 50}, {"treatment": "off", "size": 50}],
              "label": "in segment employees"
            }]
          }
        "#;
        let split: Split = serde_json::from_str(json).unwrap();
        assert_eq!(split.algo, HashAlgorithm::Murmur3);
        assert_eq!(split.status, SplitStatus::Active);
        assert_eq!(split.traffic_allocation, 100);
        assert_eq!(split.segment_names().collect::<Vec<_>>(), vec!["employees"]);

        let stored = serde_json::to_string(&split).unwrap();
        let restored: Split = serde_json::from_str(&stored).unwrap();
        assert_eq!(restored, split);
    }

    #[test]
    fn absent_fields_take_protocol_defaults() {
        let split: Split = serde_json::from_str(r#"{"name": "bare", "algo": null}"#).unwrap();
        assert_eq!(split.default_treatment, "control");
        assert_eq!(split.algo, HashAlgorithm::Legacy);
        assert!(split.conditions.is_empty());
    }
}
