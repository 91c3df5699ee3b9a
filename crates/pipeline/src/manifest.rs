//! Run manifest: what was produced, what was reused and what was skipped

use crate::cache::CacheStatus;
use footprint_algorithms::aggregate::{CombinationRule, Contributor};
use footprint_core::{Error, ErrorKind};
use serde::Serialize;
use std::path::PathBuf;

/// Reason a unit or year produced nothing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkipReason {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for SkipReason {
    fn from(e: &Error) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Files of a finished unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitArtifacts {
    pub prepared: PathBuf,
    pub prepared_cache: CacheStatus,
    pub scored: PathBuf,
    pub scored_cache: CacheStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitStatus {
    Succeeded(UnitArtifacts),
    Skipped(SkipReason),
}

/// One layer snapshot taken through preparation and scoring
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitRecord {
    pub pressure: String,
    pub layer: String,
    /// Snapshot year; absent for static layers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<i32>,
    /// Requested years this unit serves
    pub years: Vec<i32>,
    #[serde(flatten)]
    pub status: UnitStatus,
}

impl UnitRecord {
    pub fn succeeded(&self) -> Option<&UnitArtifacts> {
        match &self.status {
            UnitStatus::Succeeded(a) => Some(a),
            UnitStatus::Skipped(_) => None,
        }
    }
}

/// A requested year that resolved no snapshot for a layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Uncovered {
    pub layer: String,
    pub year: i32,
    pub reason: SkipReason,
}

/// Footprint map of a year
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapArtifacts {
    pub map: PathBuf,
    pub rule: CombinationRule,
    pub contributors: Vec<Contributor>,
    /// Per-pressure rasters
    pub pressures: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum YearStatus {
    Succeeded(MapArtifacts),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearRecord {
    pub year: i32,
    #[serde(flatten)]
    pub status: YearStatus,
}

/// Summary of a run, written to `manifest.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    pub area: String,
    pub scheme: String,
    pub resolution: f64,
    pub base: PathBuf,
    pub units: Vec<UnitRecord>,
    pub uncovered: Vec<Uncovered>,
    pub years: Vec<YearRecord>,
}

impl Manifest {
    pub fn succeeded_units(&self) -> usize {
        self.units.iter().filter(|u| u.succeeded().is_some()).count()
    }

    pub fn skipped_units(&self) -> usize {
        self.units.len() - self.succeeded_units()
    }

    /// Finished units whose prepared and scored stages were both reused
    pub fn cache_hits(&self) -> usize {
        self.units
            .iter()
            .filter_map(UnitRecord::succeeded)
            .filter(|a| a.prepared_cache == CacheStatus::Hit && a.scored_cache == CacheStatus::Hit)
            .count()
    }

    pub fn maps(&self) -> impl Iterator<Item = (i32, &MapArtifacts)> {
        self.years.iter().filter_map(|y| match &y.status {
            YearStatus::Succeeded(m) => Some((y.year, m)),
            YearStatus::Skipped(_) => None,
        })
    }

    pub fn to_json(&self) -> footprint_core::Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Other(e.to_string()))
    }
}
