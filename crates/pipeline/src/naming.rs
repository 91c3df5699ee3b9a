//! Output layout and file names
//!
//! Every name is built from identity fields; nothing parses names back.
//!
//! ```text
//! {output}/b02_base/base_{area}_{res}m.tif
//! {output}/b03_prepared/{layer}_{area}_{scheme}_{res}m_prepared_{fp}.tif
//! {output}/b04_scored/{layer}_{area}_{scheme}_{res}m_scored_{fp}.tif
//! {output}/b05_maps/p_{pressure}_{year}_{area}_{scheme}_{res}m.tif
//! {output}/b05_maps/HF_{area}_{year}_{scheme}_{res}m.tif
//! {output}/manifest.json
//! ```

use footprint_algorithms::layer::LayerIdentity;
use footprint_core::{Error, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub const BASE_DIR: &str = "b02_base";
pub const PREPARED_DIR: &str = "b03_prepared";
pub const SCORED_DIR: &str = "b04_scored";
pub const MAPS_DIR: &str = "b05_maps";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Hex characters kept from the SHA-256 digest
const FINGERPRINT_LEN: usize = 12;

/// Cached stage of a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Prepared,
    Scored,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Prepared => "prepared",
            Stage::Scored => "scored",
        }
    }

    fn dir(&self) -> &'static str {
        match self {
            Stage::Prepared => PREPARED_DIR,
            Stage::Scored => SCORED_DIR,
        }
    }
}

/// Short content hash of the JSON serialization of `value`
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value).map_err(|e| Error::Other(e.to_string()))?;
    let digest = Sha256::digest(&bytes);
    let mut hex = hex::encode(digest);
    hex.truncate(FINGERPRINT_LEN);
    Ok(hex)
}

/// Cell size as used in names: `1000`, `0p5`
pub fn resolution_label(resolution: f64) -> String {
    format!("{resolution}").replace('.', "p")
}

pub fn base_path(root: &Path, area: &str, resolution: f64) -> PathBuf {
    root.join(BASE_DIR)
        .join(format!("base_{area}_{}m.tif", resolution_label(resolution)))
}

/// Cache file of a prepared or scored layer. Snapshot years become part of
/// the layer segment.
pub fn stage_path(root: &Path, identity: &LayerIdentity, stage: Stage, fingerprint: &str) -> PathBuf {
    let layer = match identity.year {
        Some(year) => format!("{}{year}", identity.layer),
        None => identity.layer.clone(),
    };
    root.join(stage.dir()).join(format!(
        "{layer}_{}_{}_{}m_{}_{fingerprint}.tif",
        identity.area,
        identity.scheme,
        resolution_label(identity.resolution),
        stage.as_str()
    ))
}

pub fn pressure_path(
    root: &Path,
    pressure: &str,
    year: i32,
    area: &str,
    scheme: &str,
    resolution: f64,
) -> PathBuf {
    root.join(MAPS_DIR).join(format!(
        "p_{pressure}_{year}_{area}_{scheme}_{}m.tif",
        resolution_label(resolution)
    ))
}

pub fn map_path(root: &Path, area: &str, year: i32, scheme: &str, resolution: f64) -> PathBuf {
    root.join(MAPS_DIR)
        .join(format!("HF_{area}_{year}_{scheme}_{}m.tif", resolution_label(resolution)))
}

pub fn manifest_path(root: &Path) -> PathBuf {
    root.join(MANIFEST_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let root = Path::new("/out");
        let id = LayerIdentity::new("roads", "andes", "ghf", 1000.0);
        assert_eq!(
            stage_path(root, &id, Stage::Prepared, "abc123"),
            PathBuf::from("/out/b03_prepared/roads_andes_ghf_1000m_prepared_abc123.tif")
        );
        let id = id.with_year(Some(2015));
        assert_eq!(
            stage_path(root, &id, Stage::Scored, "abc123"),
            PathBuf::from("/out/b04_scored/roads2015_andes_ghf_1000m_scored_abc123.tif")
        );
        assert_eq!(
            base_path(root, "andes", 1000.0),
            PathBuf::from("/out/b02_base/base_andes_1000m.tif")
        );
        assert_eq!(
            pressure_path(root, "roads", 2015, "andes", "ghf", 1000.0),
            PathBuf::from("/out/b05_maps/p_roads_2015_andes_ghf_1000m.tif")
        );
        assert_eq!(
            map_path(root, "andes", 2015, "ghf", 1000.0),
            PathBuf::from("/out/b05_maps/HF_andes_2015_ghf_1000m.tif")
        );
    }

    #[test]
    fn fractional_resolution() {
        assert_eq!(resolution_label(0.5), "0p5");
        assert_eq!(resolution_label(250.0), "250");
    }

    #[test]
    fn fingerprint_is_stable_and_sensitive() {
        let a = fingerprint(&("roads", 1000.0)).unwrap();
        assert_eq!(a.len(), FINGERPRINT_LEN);
        assert_eq!(a, fingerprint(&("roads", 1000.0)).unwrap());
        assert_ne!(a, fingerprint(&("roads", 500.0)).unwrap());
    }
}
