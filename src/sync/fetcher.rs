//! Sources of definition changes. Transport is left to the implementor.
use serde::{Deserialize, Serialize};

use crate::{
    models::{ChangeNumber, Split},
    Result,
};

/// Splits changed between `since` and `till`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitChanges {
    #[allow(missing_docs)]
    pub splits: Vec<Split>,
    #[allow(missing_docs)]
    pub since: ChangeNumber,
    #[allow(missing_docs)]
    pub till: ChangeNumber,
}

/// Members added to or removed from a segment between `since` and `till`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentChanges {
    #[allow(missing_docs)]
    pub name: String,
    #[allow(missing_docs)]
    pub added: Vec<String>,
    #[allow(missing_docs)]
    pub removed: Vec<String>,
    #[allow(missing_docs)]
    pub since: ChangeNumber,
    #[allow(missing_docs)]
    pub till: ChangeNumber,
}

/// Fetches split changes from the control plane.
pub trait SplitFetcher: Send + Sync {
    /// Changes newer than `since`. `since == till` in the response means there is nothing newer.
    ///
    /// # Errors
    ///
    /// Returning [`Error::Unauthorized`](crate::Error::Unauthorized) stops split sync for good.
    /// Any other error is retried at the next tick.
    fn fetch(&self, since: ChangeNumber) -> Result<SplitChanges>;
}

/// Fetches segment changes from the control plane.
pub trait SegmentFetcher: Send + Sync {
    /// Changes of segment `name` newer than `since`.
    fn fetch(&self, name: &str, since: ChangeNumber) -> Result<SegmentChanges>;
}

impl<T: Fn(ChangeNumber) -> Result<SplitChanges> + Send + Sync> SplitFetcher for T {
    fn fetch(&self, since: ChangeNumber) -> Result<SplitChanges> {
        self(since)
    }
}

impl<T: Fn(&str, ChangeNumber) -> Result<SegmentChanges> + Send + Sync> SegmentFetcher for T {
    fn fetch(&self, name: &str, since: ChangeNumber) -> Result<SegmentChanges> {
        self(name, since)
    }
}
