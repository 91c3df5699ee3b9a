//! # Footprint Algorithms
//!
//! Raster stages of the Human Footprint workflow.
//!
//! ## Stages
//!
//! - **template**: grid template and study-area mask from a boundary
//! - **ingest**: resample, rasterize or distance-transform a source layer
//!   onto the template
//! - **scoring**: score tables turning prepared values into influence scores
//! - **temporal**: snapshot selection for multitemporal layers
//! - **aggregate**: pressure combination into footprint maps

pub mod aggregate;
pub mod ingest;
pub mod layer;
pub mod scoring;
pub mod temporal;
pub mod template;

pub(crate) mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::aggregate::{
        aggregate, combine_pressure, CombinationRule, Contributor, HumanFootprintMap, PressureMap,
    };
    pub use crate::ingest::{
        ingest, proximity, rasterize, resample, BurnValue, LayerSource, PreparationMethod,
        RasterizeParams, ResampleMethod, ResampleParams,
    };
    pub use crate::layer::{LayerIdentity, PreparedLayer, ScoredLayer};
    pub use crate::scoring::{
        score_layer, score_raster, CategoryClass, ScoreBin, ScoreTable, ScoringScheme,
    };
    pub use crate::temporal::{Resolved, Snapshots, TemporalPolicy};
    pub use crate::template::{build_template, GridTemplate, StudyArea, TemplateParams};
    pub use footprint_core::prelude::*;
}
