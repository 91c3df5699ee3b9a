//! Picking the snapshot of a multitemporal layer for a requested year

use footprint_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a requested year maps onto available snapshot years
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalPolicy {
    /// Most recent snapshot not after the requested year
    #[default]
    LatestNotAfter,
    /// Closest snapshot in either direction, earlier year on ties
    Nearest,
}

/// A layer's sources across time
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshots<T> {
    /// One source valid for every year
    Static(T),
    /// Sources keyed by snapshot year
    Yearly(BTreeMap<i32, T>),
}

/// Resolution of one layer for one year
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved<'a, T> {
    /// Snapshot year used; `None` for static layers
    pub year: Option<i32>,
    pub source: &'a T,
}

impl<T> Snapshots<T> {
    pub fn is_static(&self) -> bool {
        matches!(self, Snapshots::Static(_))
    }

    /// Snapshot years in ascending order
    pub fn years(&self) -> Vec<i32> {
        match self {
            Snapshots::Static(_) => Vec::new(),
            Snapshots::Yearly(map) => map.keys().copied().collect(),
        }
    }

    /// Pick the source for `year`.
    ///
    /// Static layers resolve for every year. Yearly layers fail with
    /// [`Error::NoTemporalCoverage`] when the policy finds no snapshot.
    pub fn resolve(&self, layer: &str, year: i32, policy: TemporalPolicy) -> Result<Resolved<'_, T>> {
        let map = match self {
            Snapshots::Static(source) => return Ok(Resolved { year: None, source }),
            Snapshots::Yearly(map) => map,
        };

        let before = map.range(..=year).next_back();
        let picked = match policy {
            TemporalPolicy::LatestNotAfter => before,
            TemporalPolicy::Nearest => {
                let after = map.range(year..).next();
                match (before, after) {
                    (Some(b), Some(a)) => {
                        if (a.0 - year) < (year - b.0) {
                            Some(a)
                        } else {
                            Some(b)
                        }
                    }
                    (b, a) => b.or(a),
                }
            }
        };

        picked
            .map(|(&y, source)| Resolved { year: Some(y), source })
            .ok_or_else(|| Error::NoTemporalCoverage {
                layer: layer.to_string(),
                year,
            })
    }
}
