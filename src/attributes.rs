use std::collections::HashMap;

use derive_more::From;
use serde::{Deserialize, Serialize};

/// Type alias for a HashMap representing key-value pairs of attributes.
///
/// Keys are strings representing attribute names.
///
/// # Examples
/// ```
/// # use splitio_core::{Attributes, AttributeValue};
/// let attributes = [
///     ("age".to_owned(), 30.0.into()),
///     ("is_premium_member".to_owned(), true.into()),
///     ("plan".to_owned(), "enterprise".into()),
///     ("permissions".to_owned(), vec!["read".to_owned(), "write".to_owned()].into()),
/// ].into_iter().collect::<Attributes>();
/// ```
pub type Attributes = HashMap<String, AttributeValue>;

/// Enum representing possible values of an attribute passed to evaluation.
///
/// Dates are passed as numbers (milliseconds since Unix epoch).
#[derive(Debug, Serialize, Deserialize, PartialEq, PartialOrd, From, Clone)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A string value.
    String(String),
    /// A numerical value.
    Number(f64),
    /// A boolean value.
    Boolean(bool),
    /// A list of strings. Used by set matchers.
    List(Vec<String>),
    /// A null value or absence of value.
    Null,
}

impl AttributeValue {
    pub(crate) fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Return the value as an integer. Numbers with a fractional part and unparsable strings
    /// are a type mismatch.
    pub(crate) fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Number(n) if n.is_finite() && n.fract() == 0.0 => Some(*n as i64),
            AttributeValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub(crate) fn as_boolean(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            AttributeValue::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
            AttributeValue::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    pub(crate) fn as_list(&self) -> Option<&[String]> {
        match self {
            AttributeValue::List(values) => Some(values),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}
