use std::collections::HashSet;

use crate::{
    models::ChangeNumber,
    storage::{
        shared::{PrefixedClient, SEGMENT_KEY_PREFIX},
        SegmentStorage, NO_CHANGE_NUMBER,
    },
    Result,
};

/// Segment cache kept in a shared backend: one set per segment plus a till key.
///
/// | Key | Type | Content |
/// |---|---|---|
/// | `SPLITIO.segment.<name>` | set | member keys |
/// | `SPLITIO.segment.<name>.till` | string | change number of the stored members |
///
/// The layout is shared with the other Split SDKs, so it is kept even though a segment named
/// `<name>.till` shares its member key with the till key of segment `<name>`. Storing both
/// breaks reads of `<name>` with a wrong-type error.
pub struct SharedSegmentStorage {
    client: PrefixedClient,
}

fn segment_key(name: &str) -> String {
    format!("{SEGMENT_KEY_PREFIX}{name}")
}

fn till_key(name: &str) -> String {
    format!("{SEGMENT_KEY_PREFIX}{name}.till")
}

impl SharedSegmentStorage {
    /// Create segment storage on top of `client`.
    pub fn new(client: PrefixedClient) -> SharedSegmentStorage {
        SharedSegmentStorage { client }
    }

    fn stored_till(&self, name: &str) -> Result<Option<ChangeNumber>> {
        Ok(self
            .client
            .get(&till_key(name))?
            .and_then(|value| value.parse().ok()))
    }
}

impl SegmentStorage for SharedSegmentStorage {
    fn get(&self, name: &str) -> Result<Option<HashSet<String>>> {
        let members = self.client.set_members(&segment_key(name))?;
        // The backend drops empty sets, so an empty segment only exists through its till.
        if members.is_empty() && self.stored_till(name)?.is_none() {
            return Ok(None);
        }
        Ok(Some(members))
    }

    fn put(&self, name: &str, keys: HashSet<String>, till: ChangeNumber) -> Result<()> {
        self.client.replace_set(&segment_key(name), &keys)?;
        self.client.set(&till_key(name), &till.to_string())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.client.del(&[segment_key(name), till_key(name)])
    }

    fn contains_key(&self, name: &str, key: &str) -> Result<bool> {
        self.client.set_contains(&segment_key(name), key)
    }

    fn till(&self, name: &str) -> Result<ChangeNumber> {
        Ok(self.stored_till(name)?.unwrap_or(NO_CHANGE_NUMBER))
    }

    fn clear(&self) -> Result<()> {
        let keys = self.client.keys(SEGMENT_KEY_PREFIX)?;
        self.client.del(&keys)
    }
}
