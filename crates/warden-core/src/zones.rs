//! Availability-zone allocation
//!
//! Allocations are random but fair: distinct zones are always preferred and a
//! zone only repeats once every configured zone is used. The random source is
//! passed in by the caller so allocations are reproducible in tests.

use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::BTreeSet;

use crate::error::{CoreError, Result};

/// Ordered set of valid availability zones
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneSet {
    zones: Vec<String>,
}

impl ZoneSet {
    /// Build from configuration; duplicates are dropped, order is kept
    pub fn new<I, S>(zones: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = BTreeSet::new();
        let zones: Vec<String> = zones
            .into_iter()
            .map(|z| {
                let z: String = z.into();
                z.trim().to_string()
            })
            .filter(|z| !z.is_empty() && seen.insert(z.clone()))
            .collect();

        if zones.is_empty() {
            return Err(CoreError::invalid_config(
                "at least one availability zone must be configured",
            ));
        }
        Ok(Self { zones })
    }

    /// Parse a comma-separated zone list
    pub fn parse(value: &str) -> Result<Self> {
        Self::new(value.split(','))
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn contains(&self, zone: &str) -> bool {
        self.zones.iter().any(|z| z == zone)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.zones
    }

    /// Zones in `chosen` that are not part of this set
    pub fn unknown<'a>(&self, chosen: &'a [String]) -> Vec<&'a str> {
        chosen
            .iter()
            .filter(|z| !self.contains(z))
            .map(String::as_str)
            .collect()
    }
}

/// Pick `count` zones, sorted ascending
///
/// The valid list is repeated until it holds at least `count` entries, then
/// shuffled, truncated and sorted.
pub fn allocate<R: Rng + ?Sized>(count: usize, zones: &ZoneSet, rng: &mut R) -> Vec<String> {
    if count == 0 {
        return Vec::new();
    }

    let mut pool: Vec<String> = Vec::with_capacity(count.max(zones.len()));
    while pool.len() < count {
        pool.extend(zones.as_slice().iter().cloned());
    }
    // shuffle each full round separately so that a zone can only repeat after
    // every other zone has been used once
    let mut chosen: Vec<String> = pool
        .chunks_mut(zones.len())
        .flat_map(|round| {
            round.shuffle(&mut *rng);
            round.to_vec()
        })
        .take(count)
        .collect();
    chosen.sort();
    chosen
}

/// Pick `count` zones while keeping `current`
///
/// Used when a single-zone control plane scales up: the zone that already
/// hosts the existing replica must stay part of the allocation.
pub fn allocate_pinned<R: Rng + ?Sized>(
    current: &str,
    count: usize,
    zones: &ZoneSet,
    rng: &mut R,
) -> Vec<String> {
    if count == 0 {
        return Vec::new();
    }

    let mut others: Vec<String> = zones
        .as_slice()
        .iter()
        .filter(|z| z.as_str() != current)
        .cloned()
        .collect();
    others.shuffle(rng);

    let mut chosen = vec![current.to_string()];
    if others.is_empty() {
        chosen.resize(count, current.to_string());
    } else {
        chosen.extend(others.iter().cycle().take(count - 1).cloned());
    }
    chosen.sort();
    chosen
}

/// Whether `chosen` uses as many distinct zones as the valid set allows
pub fn has_max_distinct(chosen: &[String], zones: &ZoneSet) -> bool {
    let distinct: BTreeSet<&str> = chosen.iter().map(String::as_str).collect();
    distinct.len() == chosen.len().min(zones.len())
}
