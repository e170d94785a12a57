use crate::{Error, Result};

/// Maximum length, in characters, of a matching or bucketing key accepted for evaluation.
pub const MAX_KEY_LENGTH: usize = 250;

/// Identity a treatment is evaluated for.
///
/// Most callers pass a plain key, which is used both for matching and for bucketing. A compound
/// key lets the caller bucket on a different identifier (e.g., a device id) than the one used to
/// match targeting rules.
///
/// ```
/// # use splitio_core::Key;
/// let simple: Key = "user-1".into();
/// let compound = Key::compound("user-1", "device-9");
/// assert_eq!(simple.resolve().unwrap(), ("user-1", "user-1"));
/// assert_eq!(compound.resolve().unwrap(), ("user-1", "device-9"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// Single key used for matching and bucketing.
    Simple(String),
    /// Separate matching and bucketing keys.
    Compound {
        /// Key targeting rules are matched against.
        matching_key: String,
        /// Key hashed to pick a partition.
        bucketing_key: String,
    },
}

impl Key {
    /// Create a compound key.
    pub fn compound(matching_key: impl Into<String>, bucketing_key: impl Into<String>) -> Key {
        Key::Compound {
            matching_key: matching_key.into(),
            bucketing_key: bucketing_key.into(),
        }
    }

    /// Resolve the key into `(matching_key, bucketing_key)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if either key is empty or longer than [`MAX_KEY_LENGTH`].
    pub fn resolve(&self) -> Result<(&str, &str)> {
        let (matching_key, bucketing_key) = match self {
            Key::Simple(key) => (key.as_str(), key.as_str()),
            Key::Compound {
                matching_key,
                bucketing_key,
            } => (matching_key.as_str(), bucketing_key.as_str()),
        };
        validate(matching_key, "matching key")?;
        validate(bucketing_key, "bucketing key")?;
        Ok((matching_key, bucketing_key))
    }
}

fn validate(key: &str, what: &'static str) -> Result<()> {
    if key.trim().is_empty() {
        log::error!(target: "splitio", key_type = what; "key must be a non-empty string");
        return Err(Error::InvalidKey("key must be a non-empty string"));
    }
    if key.chars().count() > MAX_KEY_LENGTH {
        log::error!(target: "splitio", key_type = what; "key is longer than {MAX_KEY_LENGTH} characters");
        return Err(Error::InvalidKey("key is too long"));
    }
    Ok(())
}

impl From<String> for Key {
    fn from(value: String) -> Key {
        Key::Simple(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Key {
        Key::Simple(value.to_owned())
    }
}

impl From<(String, String)> for Key {
    fn from((matching_key, bucketing_key): (String, String)) -> Key {
        Key::compound(matching_key, bucketing_key)
    }
}

#[cfg(test)]
mod tests {
    use super::{Key, MAX_KEY_LENGTH};
    use crate::Error;

    #[test]
    fn simple_key_buckets_on_itself() {
        let key = Key::from("alice");
        assert_eq!(key.resolve().unwrap(), ("alice", "alice"));
    }

    #[test]
    fn compound_key_keeps_both_parts() {
        let key = Key::from(("alice".to_owned(), "device-1".to_owned()));
        assert_eq!(key.resolve().unwrap(), ("alice", "device-1"));
    }

    #[test]
    fn rejects_empty_keys() {
        assert!(matches!(
            Key::from("").resolve(),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            Key::compound("alice", "  ").resolve(),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn rejects_long_keys() {
        let key = Key::from("k".repeat(MAX_KEY_LENGTH + 1));
        assert!(key.resolve().is_err());
        let key = Key::from("k".repeat(MAX_KEY_LENGTH));
        assert!(key.resolve().is_ok());
    }

    #[test]
    fn length_is_counted_in_characters() {
        let key = Key::from("ü".repeat(MAX_KEY_LENGTH));
        assert!(key.resolve().is_ok());
        let key = Key::from("ü".repeat(MAX_KEY_LENGTH + 1));
        assert!(key.resolve().is_err());
    }
}
