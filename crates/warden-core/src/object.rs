//! Object capabilities
//!
//! Rules and helpers only ask for the narrow capability they need instead of
//! a concrete schema type, so the same helper works across schema generations.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::labels;
use crate::version::ReleaseVersion;

/// Object carrying labels
pub trait Labelled {
    fn labels(&self) -> Option<&BTreeMap<String, String>>;

    fn label(&self, key: &str) -> Option<&str> {
        self.labels()?.get(key).map(String::as_str)
    }

    /// Owned copy of the labels, empty when unset
    fn label_map(&self) -> BTreeMap<String, String> {
        self.labels().cloned().unwrap_or_default()
    }
}

/// Object carrying annotations
pub trait Annotated {
    fn annotations(&self) -> Option<&BTreeMap<String, String>>;

    fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations()?.get(key).map(String::as_str)
    }

    fn annotation_map(&self) -> BTreeMap<String, String> {
        self.annotations().cloned().unwrap_or_default()
    }
}

/// Object tagged with a release version label
pub trait Released: Labelled {
    /// Raw release label, if set and non-empty
    fn release_label(&self) -> Option<&str> {
        self.label(labels::RELEASE_VERSION).filter(|v| !v.is_empty())
    }

    /// Parsed release version; a malformed label is an error
    fn release_version(&self) -> Result<Option<ReleaseVersion>> {
        self.release_label().map(ReleaseVersion::parse).transpose()
    }
}

impl<T: Labelled + ?Sized> Released for T {}

/// Object with an availability-zone list
pub trait Zoned {
    /// `None` when the object does not define zones yet
    fn availability_zones(&self) -> Option<Vec<String>>;

    fn zone_count(&self) -> usize {
        self.availability_zones().map_or(0, |z| z.len())
    }
}
