//! Write-once raster cache with atomic publish
//!
//! A cache entry is a GeoTIFF whose name carries the fingerprint of its
//! inputs. Files are written to a temporary sibling and renamed into place,
//! so a visible file is always complete.

use footprint_algorithms::template::GridTemplate;
use footprint_core::io::{read_geotiff, write_geotiff, GeoTiffOptions, TiffCompression};
use footprint_core::{Error, Raster, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// Whether a stage was reused or computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Hit,
    Created,
}

fn options() -> Option<GeoTiffOptions> {
    Some(GeoTiffOptions {
        compression: TiffCompression::Deflate,
    })
}

fn temp_in(path: &Path) -> Result<tempfile::NamedTempFile> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Other(format!("{} has no parent directory", path.display())))?;
    std::fs::create_dir_all(dir)?;
    Ok(tempfile::Builder::new()
        .prefix(".partial-")
        .suffix(".tmp")
        .tempfile_in(dir)?)
}

/// Write `raster` to `path` through a temporary file in the same directory
pub fn publish(raster: &Raster<f64>, path: &Path) -> Result<()> {
    let tmp = temp_in(path)?;
    write_geotiff(raster, tmp.path(), options())?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Atomically write text (the run manifest)
pub fn publish_text(text: &str, path: &Path) -> Result<()> {
    let mut tmp = temp_in(path)?;
    tmp.write_all(text.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Return the cached raster at `path` or compute and publish it.
///
/// An existing file that cannot be read or does not match `template` is
/// recomputed and replaced.
pub fn load_or_create<F>(path: &Path, template: &GridTemplate, create: F) -> Result<(Raster<f64>, CacheStatus)>
where
    F: FnOnce() -> Result<Raster<f64>>,
{
    if path.exists() {
        match read_geotiff::<f64, _>(path).and_then(|r| template.check(&r).map(|_| r)) {
            Ok(raster) => {
                tracing::debug!(path = %path.display(), "cache hit");
                return Ok((raster, CacheStatus::Hit));
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding stale cache entry");
            }
        }
    }

    let raster = create()?;
    template.check(&raster)?;
    publish(&raster, path)?;
    tracing::debug!(path = %path.display(), "cache entry written");
    Ok((raster, CacheStatus::Created))
}
