//! # Footprint Core
//!
//! Core types, traits and I/O for the Human Footprint pipeline.
//!
//! This crate provides:
//! - `Raster<T>`: georeferenced grid with nodata and CRS
//! - `GeoTransform`: affine georeferencing
//! - `CRS` and `Transformer`: EPSG identification and pure-Rust reprojection
//! - `Error` with an `ErrorKind` classification used to scope failures
//! - GeoTIFF and GeoJSON I/O

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod vector;

pub use crs::{Transformer, CRS};
pub use error::{Error, ErrorKind, Result};
pub use raster::{GeoTransform, Raster, RasterElement};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::{Transformer, CRS};
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
    pub use crate::vector::{AttributeValue, Feature, FeatureCollection};
}
