//! Run orchestration
//!
//! A run builds the study area once, then takes every (layer, snapshot)
//! unit through preparation and scoring on the worker pool, and finally
//! combines the scored layers year by year. Failures of a unit or a year are
//! recorded in the manifest; only study-area setup aborts the run.

use crate::cache;
use crate::config::{LayerConfig, PressureConfig, RunConfig};
use crate::manifest::{
    Manifest, MapArtifacts, SkipReason, Uncovered, UnitArtifacts, UnitRecord, UnitStatus,
    YearRecord, YearStatus,
};
use crate::naming::{self, Stage};
use crate::parallel::ProcessingMode;
use footprint_algorithms::aggregate::{aggregate, combine_pressure, PressureMap};
use footprint_algorithms::ingest::{ingest, LayerSource, PreparationMethod};
use footprint_algorithms::layer::{LayerIdentity, PreparedLayer};
use footprint_algorithms::scoring::{score_layer, ScoreTable};
use footprint_algorithms::template::{build_template, GridTemplate, StudyArea};
use footprint_core::io::{read_geojson, read_geotiff};
use footprint_core::{Error, Raster, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};

/// Run events for progress reporting
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    /// Study area ready, units planned
    Planned { units: usize, years: usize },
    UnitFinished { layer: String, snapshot: Option<i32>, ok: bool },
    YearFinished { year: i32, ok: bool },
}

/// A layer snapshot to prepare and score
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedUnit {
    pub pressure: String,
    pub layer: String,
    pub snapshot: Option<i32>,
    pub source: PathBuf,
    /// Requested years resolving to this snapshot
    pub years: Vec<i32>,
}

/// Snapshot resolution of every layer for every requested year
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub years: Vec<i32>,
    pub units: Vec<PlannedUnit>,
    pub uncovered: Vec<Uncovered>,
}

/// Resolve every layer for every requested year without touching rasters
pub fn plan(config: &RunConfig) -> Plan {
    let years: Vec<i32> = config.years.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
    let mut plan = Plan {
        years: years.clone(),
        ..Plan::default()
    };

    for (pressure, layer) in config.layers() {
        let sources = layer.sources();
        for &year in &years {
            match sources.resolve(&layer.name, year, config.temporal_policy) {
                Ok(resolved) => {
                    let existing = plan
                        .units
                        .iter_mut()
                        .find(|u| u.layer == layer.name && u.snapshot == resolved.year);
                    match existing {
                        Some(unit) => unit.years.push(year),
                        None => plan.units.push(PlannedUnit {
                            pressure: pressure.name.clone(),
                            layer: layer.name.clone(),
                            snapshot: resolved.year,
                            source: resolved.source.clone(),
                            years: vec![year],
                        }),
                    }
                }
                Err(e) => {
                    debug!(layer = layer.name.as_str(), year, "no snapshot");
                    plan.uncovered.push(Uncovered {
                        layer: layer.name.clone(),
                        year,
                        reason: SkipReason::from(&e),
                    });
                }
            }
        }
    }
    plan
}

/// Read the boundary and build the template and mask
pub fn prepare_study_area(config: &RunConfig) -> Result<StudyArea> {
    let boundary = read_geojson(&config.study_area.boundary)?;
    build_template(
        &config.study_area.name,
        &boundary,
        &config.study_area.template_params()?,
    )
}

/// Size and modification time of an input, part of cache keys
#[derive(Debug, Serialize)]
struct SourceStamp {
    path: PathBuf,
    len: u64,
    modified: Option<(u64, u32)>,
}

impl SourceStamp {
    fn of(path: &Path) -> Result<Self> {
        let meta = std::fs::metadata(path).map_err(|e| Error::unreadable(path, e))?;
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| (d.as_secs(), d.subsec_nanos()));
        Ok(Self {
            path: path.to_path_buf(),
            len: meta.len(),
            modified,
        })
    }
}

#[derive(Serialize)]
struct PreparedKey<'a> {
    source: &'a SourceStamp,
    boundary: &'a SourceStamp,
    crs: Option<&'a str>,
    method: &'a PreparationMethod,
    template: &'a GridTemplate,
}

#[derive(Serialize)]
struct ScoredKey<'a> {
    prepared: &'a str,
    table: &'a str,
    definition: &'a ScoreTable,
    range: (f64, f64),
}

fn load_source(path: &Path) -> Result<LayerSource> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "tif" | "tiff" => Ok(LayerSource::Raster(read_geotiff(path)?)),
        "geojson" | "json" => Ok(LayerSource::Vector(read_geojson(path)?)),
        _ => Err(Error::unreadable(path, "expected a GeoTIFF or GeoJSON file")),
    }
}

/// Shared, read-only state of a run
struct Context<'a> {
    config: &'a RunConfig,
    area: &'a StudyArea,
    boundary: SourceStamp,
    root: &'a Path,
}

impl Context<'_> {
    fn layer(&self, name: &str) -> Result<(&PressureConfig, &LayerConfig)> {
        self.config
            .layers()
            .find(|(_, l)| l.name == name)
            .ok_or_else(|| Error::Configuration(format!("unknown layer {name}")))
    }

    fn run_unit(&self, unit: &PlannedUnit) -> Result<(UnitArtifacts, Raster<f64>)> {
        let (_, layer) = self.layer(&unit.layer)?;
        let scheme = &self.config.scheme;
        let template = &self.area.template;
        let identity = LayerIdentity::new(&layer.name, &self.area.name, &scheme.name, template.cell_size())
            .with_year(unit.snapshot);

        let source = SourceStamp::of(&unit.source)?;
        let prepared_fp = naming::fingerprint(&PreparedKey {
            source: &source,
            boundary: &self.boundary,
            crs: layer.crs.as_deref(),
            method: &layer.method,
            template,
        })?;
        let prepared_path = naming::stage_path(self.root, &identity, Stage::Prepared, &prepared_fp);

        let (raster, prepared_cache) = cache::load_or_create(&prepared_path, template, || {
            let crs_override = layer.crs_override()?;
            let source = load_source(&unit.source)?;
            ingest(identity.clone(), &source, crs_override.as_ref(), self.area, &layer.method)
                .map(|p| p.raster)
        })?;
        let prepared = PreparedLayer {
            identity: identity.clone(),
            method: layer.method.clone(),
            raster,
        };

        let scored_fp = naming::fingerprint(&ScoredKey {
            prepared: &prepared_fp,
            table: &layer.table,
            definition: scheme.table(&layer.table)?,
            range: (scheme.min_score, scheme.max_score),
        })?;
        let scored_path = naming::stage_path(self.root, &identity, Stage::Scored, &scored_fp);
        let (scored, scored_cache) = cache::load_or_create(&scored_path, template, || {
            score_layer(&prepared, scheme, &layer.table).map(|s| s.raster)
        })?;

        debug!(
            layer = %identity,
            prepared = ?prepared_cache,
            scored = ?scored_cache,
            "unit finished"
        );

        Ok((
            UnitArtifacts {
                prepared: prepared_path,
                prepared_cache,
                scored: scored_path,
                scored_cache,
            },
            scored,
        ))
    }

    fn run_year(&self, year: i32, units: &[(UnitRecord, Option<Raster<f64>>)]) -> Result<MapArtifacts> {
        let scheme = &self.config.scheme;
        let resolution = self.area.template.cell_size();

        let mut pressures: Vec<PressureMap> = Vec::new();
        let mut pressure_paths = Vec::new();
        for pressure in &self.config.pressures {
            let layers: Vec<(&str, &Raster<f64>)> = units
                .iter()
                .filter(|(u, _)| u.pressure == pressure.name && u.years.contains(&year))
                .filter_map(|(u, r)| r.as_ref().map(|r| (u.layer.as_str(), r)))
                .collect();
            if layers.is_empty() {
                warn!(pressure = pressure.name.as_str(), year, "no scored layers, pressure left out");
                continue;
            }

            let map = combine_pressure(self.area, &pressure.name, year, &layers)?;
            let path = naming::pressure_path(self.root, &pressure.name, year, &self.area.name, &scheme.name, resolution);
            cache::publish(&map.raster, &path)?;
            pressure_paths.push(path);
            pressures.push(map);
        }

        let map = aggregate(
            self.area,
            &scheme.name,
            &scheme.combination,
            scheme.max_score,
            year,
            &pressures,
        )?;
        let path = naming::map_path(self.root, &self.area.name, year, &scheme.name, resolution);
        cache::publish(&map.raster, &path)?;

        Ok(MapArtifacts {
            map: path,
            rule: map.rule,
            contributors: map.contributors,
            pressures: pressure_paths,
        })
    }
}

/// Run with the configured worker count and no progress reporting
pub fn run(config: &RunConfig) -> Result<Manifest> {
    run_with_progress(config, ProcessingMode::from_workers(config.workers), &|_| {})
}

/// Execute a full run and write its manifest
pub fn run_with_progress(
    config: &RunConfig,
    mode: ProcessingMode,
    progress: &(dyn Fn(&Progress) + Sync),
) -> Result<Manifest> {
    let root = config.output_dir.as_path();
    std::fs::create_dir_all(root)?;

    let area = prepare_study_area(config)?;
    let resolution = area.template.cell_size();
    let base = naming::base_path(root, &area.name, resolution);
    cache::publish(&area.base_raster(), &base)?;
    info!(
        area = area.name.as_str(),
        rows = area.template.rows,
        cols = area.template.cols,
        inside = area.inside_count(),
        "study area ready"
    );

    let plan = plan(config);
    progress(&Progress::Planned {
        units: plan.units.len(),
        years: plan.years.len(),
    });
    info!(
        units = plan.units.len(),
        uncovered = plan.uncovered.len(),
        threads = mode.threads(),
        "processing units"
    );

    let ctx = Context {
        config,
        area: &area,
        boundary: SourceStamp::of(&config.study_area.boundary)?,
        root,
    };

    let units: Vec<(UnitRecord, Option<Raster<f64>>)> = mode.map(&plan.units, |unit| {
        let (status, raster) = match ctx.run_unit(unit) {
            Ok((artifacts, raster)) => (UnitStatus::Succeeded(artifacts), Some(raster)),
            Err(e) => {
                warn!(layer = unit.layer.as_str(), snapshot = ?unit.snapshot, error = %e, "unit skipped");
                (UnitStatus::Skipped(SkipReason::from(&e)), None)
            }
        };
        progress(&Progress::UnitFinished {
            layer: unit.layer.clone(),
            snapshot: unit.snapshot,
            ok: raster.is_some(),
        });
        let record = UnitRecord {
            pressure: unit.pressure.clone(),
            layer: unit.layer.clone(),
            snapshot: unit.snapshot,
            years: unit.years.clone(),
            status,
        };
        (record, raster)
    })?;

    let mut years = Vec::with_capacity(plan.years.len());
    for &year in &plan.years {
        let status = match ctx.run_year(year, &units) {
            Ok(artifacts) => {
                info!(year, map = %artifacts.map.display(), "footprint map written");
                YearStatus::Succeeded(artifacts)
            }
            Err(e) => {
                warn!(year, error = %e, "year skipped");
                YearStatus::Skipped(SkipReason::from(&e))
            }
        };
        progress(&Progress::YearFinished {
            year,
            ok: matches!(status, YearStatus::Succeeded(_)),
        });
        years.push(YearRecord { year, status });
    }

    let manifest = Manifest {
        area: area.name.clone(),
        scheme: config.scheme.name.clone(),
        resolution,
        base,
        units: units.into_iter().map(|(record, _)| record).collect(),
        uncovered: plan.uncovered,
        years,
    };
    cache::publish_text(&manifest.to_json()?, &naming::manifest_path(root))?;
    info!(
        succeeded = manifest.succeeded_units(),
        skipped = manifest.skipped_units(),
        cache_hits = manifest.cache_hits(),
        "run finished"
    );
    Ok(manifest)
}
