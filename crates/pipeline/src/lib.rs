//! # Footprint Pipeline
//!
//! Configuration, caching and orchestration of Human Footprint runs.
//!
//! - **config**: JSON run file, validated before any raster I/O
//! - **naming**: output layout and parameter fingerprints
//! - **cache**: write-once GeoTIFF cache with atomic publish
//! - **run**: per-unit preparation and scoring, per-year aggregation
//! - **manifest**: record of produced, reused and skipped work

pub mod cache;
pub mod config;
pub mod manifest;
pub mod naming;
pub mod parallel;
pub mod run;

pub use cache::CacheStatus;
pub use config::{LayerConfig, PressureConfig, RunConfig, StudyAreaConfig};
pub use manifest::{Manifest, UnitStatus, YearStatus};
pub use parallel::ProcessingMode;
pub use run::{plan, prepare_study_area, run, run_with_progress, Plan, PlannedUnit, Progress};
