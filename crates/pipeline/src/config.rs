//! Run configuration
//!
//! A run is described by one JSON file. Relative paths inside it are
//! resolved against the directory of the file, and the whole document is
//! validated before any raster is touched.

use footprint_algorithms::ingest::PreparationMethod;
use footprint_algorithms::scoring::ScoringScheme;
use footprint_algorithms::temporal::{Snapshots, TemporalPolicy};
use footprint_algorithms::template::TemplateParams;
use footprint_core::{Error, Result, CRS};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

fn default_nodata() -> f64 {
    -9999.0
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

/// Boundary and grid of the study area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyAreaConfig {
    pub name: String,
    /// GeoJSON boundary polygon(s)
    pub boundary: PathBuf,
    /// Target CRS, e.g. `EPSG:32718`
    pub crs: String,
    pub cell_size: f64,
    #[serde(default = "default_nodata")]
    pub nodata: f64,
}

impl StudyAreaConfig {
    pub fn template_params(&self) -> Result<TemplateParams> {
        Ok(TemplateParams {
            cell_size: self.cell_size,
            crs: CRS::parse(&self.crs)?,
            nodata: self.nodata,
        })
    }
}

/// One pressure layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub name: String,
    /// Source valid for every year
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Yearly snapshots of a multitemporal layer
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub snapshots: BTreeMap<i32, PathBuf>,
    pub method: PreparationMethod,
    /// Score table of the scheme
    pub table: String,
    /// CRS to assume when the source declares none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<String>,
}

impl LayerConfig {
    pub fn sources(&self) -> Snapshots<PathBuf> {
        match &self.path {
            Some(path) => Snapshots::Static(path.clone()),
            None => Snapshots::Yearly(self.snapshots.clone()),
        }
    }

    pub fn crs_override(&self) -> Result<Option<CRS>> {
        self.crs.as_deref().map(CRS::parse).transpose()
    }
}

/// Named group of layers combined by cell maximum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureConfig {
    pub name: String,
    pub layers: Vec<LayerConfig>,
}

/// Everything a run needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub study_area: StudyAreaConfig,
    pub years: Vec<i32>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Worker threads: 1 runs sequentially, absent or 0 uses every core
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub temporal_policy: TemporalPolicy,
    pub scheme: ScoringScheme,
    pub pressures: Vec<PressureConfig>,
}

impl RunConfig {
    /// Load and validate a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let base = path.parent().unwrap_or(Path::new("."));
        Self::from_json(&text, base)
    }

    /// Parse and validate JSON, resolving relative paths against `base_dir`
    pub fn from_json(text: &str, base_dir: &Path) -> Result<Self> {
        let mut config: RunConfig =
            serde_json::from_str(text).map_err(|e| Error::Configuration(e.to_string()))?;
        config.resolve_paths(base_dir);
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base_dir: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base_dir.join(&*p);
            }
        };
        resolve(&mut self.study_area.boundary);
        resolve(&mut self.output_dir);
        for layer in self.pressures.iter_mut().flat_map(|p| p.layers.iter_mut()) {
            if let Some(path) = layer.path.as_mut() {
                resolve(path);
            }
            layer.snapshots.values_mut().for_each(&resolve);
        }
    }

    /// Cross-field checks; everything here fails before raster I/O
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::Configuration(msg));

        if self.years.is_empty() {
            return invalid("no years requested".into());
        }
        if !(self.study_area.cell_size > 0.0) {
            return invalid(format!("cell_size must be positive, got {}", self.study_area.cell_size));
        }
        self.study_area.template_params()?;
        self.scheme.validate()?;

        if self.pressures.is_empty() {
            return invalid("no pressures configured".into());
        }

        let mut pressure_names = BTreeSet::new();
        let mut layer_names = BTreeSet::new();
        for pressure in &self.pressures {
            if !pressure_names.insert(pressure.name.as_str()) {
                return invalid(format!("duplicate pressure {}", pressure.name));
            }
            if pressure.layers.is_empty() {
                return invalid(format!("pressure {} has no layers", pressure.name));
            }
            for layer in &pressure.layers {
                if !layer_names.insert(layer.name.as_str()) {
                    return invalid(format!("duplicate layer {}", layer.name));
                }
                match (&layer.path, layer.snapshots.is_empty()) {
                    (Some(_), true) | (None, false) => {}
                    (Some(_), false) => {
                        return invalid(format!("layer {} sets both path and snapshots", layer.name))
                    }
                    (None, true) => return invalid(format!("layer {} has no source", layer.name)),
                }
                let table = self.scheme.table(&layer.table)?;
                if table.is_categorical() && !layer.method.preserves_categories() {
                    return invalid(format!(
                        "layer {}: categorical table {} needs a category-preserving method, not {}",
                        layer.name, layer.table, layer.method
                    ));
                }
                layer.crs_override()?;
            }
        }

        self.scheme
            .combination
            .validate(self.pressures.iter().map(|p| p.name.as_str()))
    }

    pub fn layers(&self) -> impl Iterator<Item = (&PressureConfig, &LayerConfig)> {
        self.pressures
            .iter()
            .flat_map(|p| p.layers.iter().map(move |l| (p, l)))
    }
}
