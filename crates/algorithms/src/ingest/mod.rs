//! Layer ingestion
//!
//! Turns a raw source layer into a prepared layer on the grid template:
//! - rasters are reprojected and resampled ([`resample`])
//! - vectors are rasterized ([`rasterize`]) or turned into distance
//!   surfaces ([`proximity`])
//! - rasters can also become distance surfaces to the cells whose value
//!   falls in a band, after resampling
//!
//! Cells outside the study-area mask are set to nodata in every case.

pub mod proximity;
pub mod rasterize;
pub mod resample;

pub use proximity::proximity;
pub use rasterize::{rasterize, BurnValue, RasterizeParams};
pub use resample::{resample, ResampleMethod, ResampleParams};

use crate::layer::{LayerIdentity, PreparedLayer};
use crate::template::StudyArea;
use footprint_core::vector::FeatureCollection;
use footprint_core::{Error, Raster, Result, Transformer, CRS};
use geo::BoundingRect;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a raw layer becomes a prepared raster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PreparationMethod {
    /// Raster source warped onto the grid
    Resample(ResampleParams),
    /// Vector source burned onto the grid
    Rasterize(RasterizeParams),
    /// Vector source as distance to the nearest feature
    Proximity {
        #[serde(default = "default_true")]
        all_touched: bool,
    },
    /// Raster source resampled, then as distance to the nearest cell with
    /// a value in `[min, max)`
    ThresholdProximity {
        #[serde(default)]
        resample: ResampleParams,
        min: f64,
        #[serde(default)]
        max: Option<f64>,
    },
}

fn default_true() -> bool {
    true
}

impl PreparationMethod {
    /// Whether the method may emit values absent from the source
    pub fn preserves_categories(&self) -> bool {
        match self {
            PreparationMethod::Resample(p) => p.method.preserves_categories(),
            PreparationMethod::Rasterize(_) => true,
            PreparationMethod::Proximity { .. } | PreparationMethod::ThresholdProximity { .. } => false,
        }
    }
}

impl fmt::Display for PreparationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreparationMethod::Resample(p) => write!(f, "resample:{}", p.method),
            PreparationMethod::Rasterize(p) => match &p.burn {
                BurnValue::Presence => write!(f, "rasterize:presence"),
                BurnValue::Attribute { field, .. } => write!(f, "rasterize:{field}"),
            },
            PreparationMethod::Proximity { .. } => write!(f, "proximity"),
            PreparationMethod::ThresholdProximity { min, max, .. } => match max {
                Some(max) => write!(f, "proximity:[{min},{max})"),
                None => write!(f, "proximity:[{min},inf)"),
            },
        }
    }
}

/// A raw layer as loaded from storage
#[derive(Debug, Clone)]
pub enum LayerSource {
    Raster(Raster<f64>),
    Vector(FeatureCollection),
}

impl LayerSource {
    fn declared_crs(&self) -> Option<&CRS> {
        match self {
            LayerSource::Raster(r) => r.crs(),
            LayerSource::Vector(fc) => fc.crs.as_ref(),
        }
    }
}

/// Prepare `source` on the grid of `area`.
///
/// `crs_override` replaces the CRS declared by the source. A raster with
/// neither fails with `CrsMismatch`; a vector without one is read as WGS84
/// (RFC 7946). A source whose extent misses the template fails with
/// `EmptyIntersection`.
pub fn ingest(
    identity: LayerIdentity,
    source: &LayerSource,
    crs_override: Option<&CRS>,
    area: &StudyArea,
    method: &PreparationMethod,
) -> Result<PreparedLayer> {
    let layer = identity.to_string();
    let template = &area.template;

    let source_crs = match (crs_override, source.declared_crs(), source) {
        (Some(crs), _, _) => crs.clone(),
        (None, Some(crs), _) => crs.clone(),
        (None, None, LayerSource::Vector(_)) => CRS::wgs84(),
        (None, None, LayerSource::Raster(_)) => {
            return Err(Error::CrsMismatch {
                layer,
                reason: "source CRS is undefined and no override is configured".into(),
            })
        }
    };

    let mut raster = match (source, method) {
        (LayerSource::Raster(src), PreparationMethod::Resample(params)) => {
            check_extent(src, &source_crs, area, &layer)?;
            resample(src, &source_crs, template, params)?
        }
        (LayerSource::Raster(src), PreparationMethod::ThresholdProximity { resample: params, min, max }) => {
            check_extent(src, &source_crs, area, &layer)?;
            let aligned = resample(src, &source_crs, template, params)?;
            let (min, max) = (*min, *max);
            proximity(&aligned, |v| v >= min && max.is_none_or(|m| v < m))?
        }
        (LayerSource::Vector(fc), PreparationMethod::Rasterize(params)) => {
            let features = to_template_crs(fc, &source_crs, area, &layer)?;
            rasterize(&layer, &features, template, params)?
        }
        (LayerSource::Vector(fc), PreparationMethod::Proximity { all_touched }) => {
            let features = to_template_crs(fc, &source_crs, area, &layer)?;
            let burn = RasterizeParams {
                burn: BurnValue::Presence,
                all_touched: *all_touched,
                background: Some(0.0),
            };
            let presence = rasterize(&layer, &features, template, &burn)?;
            proximity(&presence, |v| v > 0.0)?
        }
        (LayerSource::Raster(_), m) => {
            return Err(Error::Configuration(format!(
                "layer {layer} is a raster but is prepared with {m}"
            )))
        }
        (LayerSource::Vector(_), m) => {
            return Err(Error::Configuration(format!(
                "layer {layer} is a vector but is prepared with {m}"
            )))
        }
    };

    area.apply_mask(&mut raster)?;
    tracing::debug!(layer = layer.as_str(), method = %method, "layer prepared");

    Ok(PreparedLayer {
        identity,
        method: method.clone(),
        raster,
    })
}

fn check_extent(src: &Raster<f64>, source_crs: &CRS, area: &StudyArea, layer: &str) -> Result<()> {
    let to_template = Transformer::new(source_crs, &area.template.crs)?;
    let extent = to_template.transform_bounds(src.bounds());
    if overlaps(extent, area.template.bounds()) {
        Ok(())
    } else {
        Err(Error::EmptyIntersection(layer.to_string()))
    }
}

/// Features reprojected to the template CRS, after checking they reach it
fn to_template_crs(
    fc: &FeatureCollection,
    source_crs: &CRS,
    area: &StudyArea,
    layer: &str,
) -> Result<FeatureCollection> {
    use geo::MapCoords;

    let template = &area.template;
    let transformer = Transformer::new(source_crs, &template.crs)?;
    let mut out = FeatureCollection::with_crs(template.crs.clone());
    let bounds = template.bounds();
    let mut touches = false;

    for feature in fc.iter() {
        let mut feature = feature.clone();
        if let Some(geometry) = feature.geometry.take() {
            let projected = if transformer.is_identity() {
                geometry
            } else {
                geometry.map_coords(|c| {
                    let (x, y) = transformer.transform(c.x, c.y);
                    geo::Coord { x, y }
                })
            };
            if let Some(rect) = projected.bounding_rect() {
                touches |= overlaps(
                    (rect.min().x, rect.min().y, rect.max().x, rect.max().y),
                    bounds,
                );
            }
            feature.geometry = Some(projected);
        }
        out.push(feature);
    }

    if !touches {
        return Err(Error::EmptyIntersection(layer.to_string()));
    }
    Ok(out)
}

fn overlaps(a: (f64, f64, f64, f64), b: (f64, f64, f64, f64)) -> bool {
    a.0 <= b.2 && b.0 <= a.2 && a.1 <= b.3 && b.1 <= a.3
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{build_template, TemplateParams};
    use footprint_core::vector::{AttributeValue, Feature};
    use footprint_core::GeoTransform;
    use geo::{line_string, polygon, Geometry};

    const NODATA: f64 = -9999.0;

    /// 4 x 4 km square in UTM 18S, 1 km cells, lower-right triangle outside
    fn area() -> StudyArea {
        let poly = polygon![
            (x: 500_000.0, y: 8_000_000.0),
            (x: 504_000.0, y: 8_000_000.0),
            (x: 500_000.0, y: 8_004_000.0)
        ];
        let mut fc = FeatureCollection::with_crs(CRS::from_epsg(32718));
        fc.push(Feature::new(Geometry::Polygon(poly)));
        build_template(
            "test",
            &fc,
            &TemplateParams { cell_size: 1000.0, crs: CRS::from_epsg(32718), nodata: NODATA },
        )
        .unwrap()
    }

    fn id() -> LayerIdentity {
        LayerIdentity::new("layer", "test", "GHF", 1000.0)
    }

    fn source_raster(crs: Option<CRS>) -> Raster<f64> {
        let mut r = Raster::filled(8, 8, 3.0);
        r.set_transform(GeoTransform::new(500_000.0, 8_004_000.0, 500.0, -500.0));
        r.set_crs(crs);
        r.set_nodata(Some(-1.0));
        r
    }

    #[test]
    fn raster_is_aligned_and_masked() {
        let area = area();
        let method = PreparationMethod::Resample(ResampleParams { method: ResampleMethod::Sum, density_per_km2: false });
        let src = LayerSource::Raster(source_raster(Some(CRS::from_epsg(32718))));

        let prepared = ingest(id(), &src, None, &area, &method).unwrap();
        area.template.check(&prepared.raster).unwrap();
        for row in 0..4 {
            for col in 0..4 {
                let v = prepared.raster.get(row, col).unwrap();
                if area.contains(row, col) {
                    assert_eq!(v, 12.0);
                } else {
                    assert_eq!(v, NODATA);
                }
            }
        }
    }

    #[test]
    fn reingestion_is_bit_identical() {
        let area = area();
        let method = PreparationMethod::Resample(ResampleParams::default());
        let src = LayerSource::Raster(source_raster(Some(CRS::from_epsg(32718))));
        let a = ingest(id(), &src, None, &area, &method).unwrap();
        let b = ingest(id(), &src, None, &area, &method).unwrap();
        let bits = |r: &Raster<f64>| r.data().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a.raster), bits(&b.raster));
    }

    #[test]
    fn undefined_raster_crs() {
        let area = area();
        let method = PreparationMethod::Resample(ResampleParams::default());
        let src = LayerSource::Raster(source_raster(None));

        let err = ingest(id(), &src, None, &area, &method).unwrap_err();
        assert!(matches!(err, Error::CrsMismatch { .. }));

        let crs = CRS::from_epsg(32718);
        assert!(ingest(id(), &src, Some(&crs), &area, &method).is_ok());
    }

    #[test]
    fn disjoint_sources_are_empty_intersections() {
        let area = area();
        let mut far = source_raster(Some(CRS::from_epsg(32718)));
        far.set_transform(GeoTransform::new(700_000.0, 8_004_000.0, 500.0, -500.0));
        let method = PreparationMethod::Resample(ResampleParams::default());
        let err = ingest(id(), &LayerSource::Raster(far), None, &area, &method).unwrap_err();
        assert!(matches!(err, Error::EmptyIntersection(_)));

        let mut fc = FeatureCollection::with_crs(CRS::from_epsg(32718));
        fc.push(Feature::new(line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 10.0)].into()));
        let err = ingest(id(), &LayerSource::Vector(fc), None, &area, &PreparationMethod::Proximity { all_touched: true })
            .unwrap_err();
        assert!(matches!(err, Error::EmptyIntersection(_)));
    }

    #[test]
    fn vector_proximity_in_metres() {
        let area = area();
        // road along the western column of cells
        let mut fc = FeatureCollection::with_crs(CRS::from_epsg(32718));
        fc.push(Feature::new(line_string![(x: 500_500.0, y: 8_000_100.0), (x: 500_500.0, y: 8_003_900.0)].into()));

        let prepared = ingest(id(), &LayerSource::Vector(fc), None, &area, &PreparationMethod::Proximity { all_touched: true }).unwrap();
        assert_eq!(prepared.raster.get(3, 0).unwrap(), 0.0);
        assert_eq!(prepared.raster.get(3, 2).unwrap(), 2000.0);
        assert_eq!(prepared.raster.get(0, 3).unwrap(), NODATA);
    }

    #[test]
    fn wgs84_vector_is_reprojected() {
        let area = area();
        let to_geo = Transformer::new(&CRS::from_epsg(32718), &CRS::wgs84()).unwrap();
        let (lon, lat) = to_geo.transform(500_500.0, 8_000_500.0);

        let mut fc = FeatureCollection::new();
        fc.push(
            Feature::new(geo::point!(x: lon, y: lat).into())
                .with_property("code", AttributeValue::Int(7)),
        );
        let method = PreparationMethod::Rasterize(RasterizeParams {
            burn: BurnValue::Attribute { field: "code".into(), codes: None },
            all_touched: true,
            background: Some(0.0),
        });
        let prepared = ingest(id(), &LayerSource::Vector(fc), None, &area, &method).unwrap();
        assert_eq!(prepared.raster.get(3, 0).unwrap(), 7.0);
        assert_eq!(prepared.method.to_string(), "rasterize:code");
    }

    #[test]
    fn raster_band_proximity() {
        let area = area();
        // 1 km source on the template grid: one cell in the band, one above it
        let mut src = Raster::filled(4, 4, 0.0);
        src.set_transform(GeoTransform::new(500_000.0, 8_004_000.0, 1000.0, -1000.0));
        src.set_crs(Some(CRS::from_epsg(32718)));
        src.set_nodata(Some(-1.0));
        src.set(3, 0, 50.0).unwrap();
        src.set(3, 2, 500.0).unwrap();

        let method: PreparationMethod =
            serde_json::from_str(r#"{"kind": "threshold_proximity", "min": 10, "max": 100}"#).unwrap();
        assert_eq!(method.to_string(), "proximity:[10,100)");
        assert!(!method.preserves_categories());

        let prepared = ingest(id(), &LayerSource::Raster(src.clone()), None, &area, &method).unwrap();
        assert_eq!(prepared.raster.get(3, 0).unwrap(), 0.0);
        assert_eq!(prepared.raster.get(2, 0).unwrap(), 1000.0);
        assert_eq!(prepared.raster.get(3, 2).unwrap(), 2000.0);
        assert_eq!(prepared.raster.get(0, 3).unwrap(), NODATA);

        // open band from 100 picks the other cell
        let method = PreparationMethod::ThresholdProximity {
            resample: ResampleParams::default(),
            min: 100.0,
            max: None,
        };
        let prepared = ingest(id(), &LayerSource::Raster(src), None, &area, &method).unwrap();
        assert_eq!(prepared.raster.get(3, 2).unwrap(), 0.0);
        assert_eq!(prepared.raster.get(3, 0).unwrap(), 2000.0);
    }

    #[test]
    fn method_must_match_source_kind() {
        let area = area();
        let src = LayerSource::Raster(source_raster(Some(CRS::from_epsg(32718))));
        let err = ingest(id(), &src, None, &area, &PreparationMethod::Proximity { all_touched: true }).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let mut fc = FeatureCollection::with_crs(CRS::from_epsg(32718));
        fc.push(Feature::new(line_string![(x: 500_500.0, y: 8_000_100.0), (x: 500_500.0, y: 8_003_900.0)].into()));
        let band = PreparationMethod::ThresholdProximity { resample: ResampleParams::default(), min: 1.0, max: None };
        let err = ingest(id(), &LayerSource::Vector(fc), None, &area, &band).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
