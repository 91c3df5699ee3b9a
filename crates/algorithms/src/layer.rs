//! Identity of derived layers
//!
//! Output names and cache keys are serializations of these fields; nothing
//! parses them back out of file names.

use crate::ingest::PreparationMethod;
use footprint_core::Raster;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who a derived raster belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerIdentity {
    /// Pressure layer name, e.g. `roads_primary`
    pub layer: String,
    /// Study area name
    pub area: String,
    /// Scoring scheme name
    pub scheme: String,
    /// Cell size of the grid template
    pub resolution: f64,
    /// Snapshot year for multitemporal layers
    pub year: Option<i32>,
}

impl LayerIdentity {
    pub fn new(
        layer: impl Into<String>,
        area: impl Into<String>,
        scheme: impl Into<String>,
        resolution: f64,
    ) -> Self {
        Self {
            layer: layer.into(),
            area: area.into(),
            scheme: scheme.into(),
            resolution,
            year: None,
        }
    }

    pub fn with_year(mut self, year: Option<i32>) -> Self {
        self.year = year;
        self
    }
}

impl fmt::Display for LayerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.year {
            Some(y) => write!(f, "{}@{}", self.layer, y),
            None => write!(f, "{}", self.layer),
        }
    }
}

/// Source layer aligned to the grid template, in native units
#[derive(Debug, Clone)]
pub struct PreparedLayer {
    pub identity: LayerIdentity,
    pub method: PreparationMethod,
    pub raster: Raster<f64>,
}

/// Prepared layer converted to scores
#[derive(Debug, Clone)]
pub struct ScoredLayer {
    pub identity: LayerIdentity,
    /// Name of the score table that produced it
    pub table: String,
    pub raster: Raster<f64>,
}
