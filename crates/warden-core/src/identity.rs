//! Caller identity and access policy

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identity of the user that issued an admission request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl Identity {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            groups: Vec::new(),
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

/// Which callers are subject to restricted checks
///
/// Upgrade and label checks only apply to human operators. Controllers and
/// automation act outside this set and are exempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    admins: BTreeSet<String>,
    restricted_groups: BTreeSet<String>,
}

impl AccessPolicy {
    pub fn new<A, G>(admins: A, restricted_groups: G) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        G: IntoIterator,
        G::Item: Into<String>,
    {
        Self {
            admins: admins.into_iter().map(Into::into).collect(),
            restricted_groups: restricted_groups.into_iter().map(Into::into).collect(),
        }
    }

    pub fn admins(&self) -> impl Iterator<Item = &str> {
        self.admins.iter().map(String::as_str)
    }

    pub fn restricted_groups(&self) -> impl Iterator<Item = &str> {
        self.restricted_groups.iter().map(String::as_str)
    }

    pub fn is_restricted(&self, identity: &Identity) -> bool {
        self.admins.contains(&identity.username)
            || self
                .restricted_groups
                .iter()
                .any(|g| identity.in_group(g))
    }
}
