//! Grid template and study-area mask
//!
//! Every raster the pipeline produces shares one grid: the template built
//! here from the study-area boundary. The boundary is also burned into a
//! mask that nulls out-of-area cells in every later layer.

use crate::ingest::rasterize::visit_geometry;
use footprint_core::vector::FeatureCollection;
use footprint_core::{Error, GeoTransform, Raster, RasterElement, Result, Transformer, CRS};
use geo::{Area, BoundingRect, Geometry, MapCoords, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};

/// Mean Earth radius (km), IUGG
const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Immutable grid descriptor shared by all rasters of a study area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridTemplate {
    pub crs: CRS,
    pub transform: GeoTransform,
    pub rows: usize,
    pub cols: usize,
    pub nodata: f64,
}

impl GridTemplate {
    pub fn new(crs: CRS, transform: GeoTransform, rows: usize, cols: usize, nodata: f64) -> Self {
        Self {
            crs,
            transform,
            rows,
            cols,
            nodata,
        }
    }

    /// Template of an existing raster, e.g. a persisted base raster
    pub fn from_raster(raster: &Raster<f64>) -> Result<Self> {
        let crs = raster
            .crs()
            .cloned()
            .ok_or_else(|| Error::GridMismatch("base raster has no CRS".into()))?;
        Ok(Self {
            crs,
            transform: *raster.transform(),
            rows: raster.rows(),
            cols: raster.cols(),
            nodata: raster.nodata().unwrap_or(-9999.0),
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    /// `(min_x, min_y, max_x, max_y)` in the template CRS
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols, self.rows)
    }

    /// New raster on this grid filled with `fill`, nodata set to the sentinel
    pub fn raster(&self, fill: f64) -> Raster<f64> {
        let mut r = Raster::filled(self.rows, self.cols, fill);
        r.set_transform(self.transform);
        r.set_crs(Some(self.crs.clone()));
        r.set_nodata(Some(self.nodata));
        r
    }

    /// Fail with `GridMismatch` unless `raster` lies exactly on this grid.
    ///
    /// A raster without a CRS never matches.
    pub fn check<T: RasterElement>(&self, raster: &Raster<T>) -> Result<()> {
        if raster.shape() != self.shape() {
            return Err(Error::GridMismatch(format!(
                "shape {:?}, expected {:?}",
                raster.shape(),
                self.shape()
            )));
        }
        if !raster.transform().approx_eq(&self.transform, self.cell_size() * 1e-6) {
            return Err(Error::GridMismatch(format!(
                "transform {:?}, expected {:?}",
                raster.transform().to_gdal(),
                self.transform.to_gdal()
            )));
        }
        match raster.crs() {
            Some(crs) if crs.is_equivalent(&self.crs) => Ok(()),
            Some(crs) => Err(Error::GridMismatch(format!("CRS {}, expected {}", crs, self.crs))),
            None => Err(Error::GridMismatch(format!("raster has no CRS, expected {}", self.crs))),
        }
    }

    /// Area of a cell of `row` in km².
    ///
    /// Projected grids are assumed to be in metres. Geographic grids use
    /// the spherical zone area of the row.
    pub fn cell_area_km2(&self, row: usize) -> f64 {
        if self.crs.is_geographic() {
            let (_, top) = self.transform.pixel_to_geo_corner(0, row);
            let (_, bottom) = self.transform.pixel_to_geo_corner(0, row + 1);
            let dlon = self.transform.pixel_width.abs().to_radians();
            EARTH_RADIUS_KM
                * EARTH_RADIUS_KM
                * dlon
                * (top.to_radians().sin() - bottom.to_radians().sin()).abs()
        } else {
            self.transform.cell_area() / 1.0e6
        }
    }
}

/// Template plus the inside/outside mask of the boundary
#[derive(Debug, Clone)]
pub struct StudyArea {
    pub name: String,
    pub template: GridTemplate,
    /// 1 inside the boundary, 0 outside
    pub mask: Raster<u8>,
}

impl StudyArea {
    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.mask.get(row, col).is_ok_and(|v| v == 1)
    }

    pub fn inside_count(&self) -> usize {
        self.mask.data().iter().filter(|&&v| v == 1).count()
    }

    /// Set every out-of-area cell of `raster` to nodata
    pub fn apply_mask(&self, raster: &mut Raster<f64>) -> Result<()> {
        self.template.check(raster)?;
        let nodata = self.template.nodata;
        ndarray::Zip::from(raster.data_mut())
            .and(self.mask.data())
            .for_each(|v, &m| {
                if m == 0 {
                    *v = nodata;
                }
            });
        raster.set_nodata(Some(nodata));
        Ok(())
    }

    /// Base raster for persisting: 1 inside, nodata outside
    pub fn base_raster(&self) -> Raster<f64> {
        let mut base = self.template.raster(1.0);
        // Shapes match by construction
        let nodata = self.template.nodata;
        ndarray::Zip::from(base.data_mut())
            .and(self.mask.data())
            .for_each(|v, &m| {
                if m == 0 {
                    *v = nodata;
                }
            });
        base
    }

    /// Rebuild from a persisted base raster
    pub fn from_base_raster(name: impl Into<String>, base: &Raster<f64>) -> Result<Self> {
        let template = GridTemplate::from_raster(base)?;
        let mut mask: Raster<u8> = base.with_same_meta(0);
        ndarray::Zip::from(mask.data_mut())
            .and(base.data())
            .for_each(|m, v| {
                if !v.is_nodata(base.nodata()) && *v != 0.0 {
                    *m = 1;
                }
            });
        Ok(Self {
            name: name.into(),
            template,
            mask,
        })
    }
}

/// Parameters for [`build_template`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateParams {
    /// Cell size in target CRS units
    pub cell_size: f64,
    pub crs: CRS,
    #[serde(default = "default_nodata")]
    pub nodata: f64,
}

fn default_nodata() -> f64 {
    -9999.0
}

/// Build the grid template and mask for a study area.
///
/// The boundary is reprojected to `params.crs` (a boundary without a
/// declared CRS is taken as WGS84) and its extent snapped outward to
/// multiples of the cell size, so the same boundary always yields the same
/// grid. A cell is inside when its centre is inside a boundary polygon.
pub fn build_template(
    name: &str,
    boundary: &FeatureCollection,
    params: &TemplateParams,
) -> Result<StudyArea> {
    if !(params.cell_size.is_finite() && params.cell_size > 0.0) {
        return Err(Error::InvalidParameter {
            name: "cell_size",
            value: params.cell_size.to_string(),
            reason: "must be positive".into(),
        });
    }

    let source_crs = boundary.crs.clone().unwrap_or_else(CRS::wgs84);
    let transformer = Transformer::new(&source_crs, &params.crs)?;

    let polygons: Vec<Polygon<f64>> = boundary
        .iter()
        .filter_map(|f| f.geometry.as_ref())
        .flat_map(polygons_of)
        .map(|p| p.map_coords(|c| {
            let (x, y) = transformer.transform(c.x, c.y);
            geo::Coord { x, y }
        }))
        .filter(is_valid_polygon)
        .collect();

    if polygons.is_empty() {
        return Err(Error::InvalidGeometry(format!(
            "boundary of {name} has no valid polygon"
        )));
    }

    let multi = MultiPolygon::new(polygons);
    let rect = multi
        .bounding_rect()
        .ok_or_else(|| Error::InvalidGeometry(format!("boundary of {name} has no extent")))?;

    let cs = params.cell_size;
    let min_x = (rect.min().x / cs).floor() * cs;
    let max_y = (rect.max().y / cs).ceil() * cs;
    let cols = ((rect.max().x - min_x) / cs).ceil().max(1.0) as usize;
    let rows = ((max_y - rect.min().y) / cs).ceil().max(1.0) as usize;

    let transform = GeoTransform::new(min_x, max_y, cs, -cs);
    let template = GridTemplate::new(params.crs.clone(), transform, rows, cols, params.nodata);

    let mut mask: Raster<u8> = Raster::new(rows, cols);
    mask.set_transform(transform);
    mask.set_crs(Some(params.crs.clone()));
    {
        let data = mask.data_mut();
        visit_geometry(&Geometry::MultiPolygon(multi), &transform, rows, cols, false, &mut |r, c| {
            data[(r, c)] = 1;
        });
    }

    let area = StudyArea {
        name: name.to_string(),
        template,
        mask,
    };

    if area.inside_count() == 0 {
        return Err(Error::InvalidGeometry(format!(
            "boundary of {name} covers no cell centre at {cs} units"
        )));
    }

    tracing::info!(
        area = name,
        rows,
        cols,
        inside = area.inside_count(),
        "grid template built"
    );
    Ok(area)
}

fn polygons_of(geometry: &Geometry<f64>) -> Vec<Polygon<f64>> {
    match geometry {
        Geometry::Polygon(p) => vec![p.clone()],
        Geometry::MultiPolygon(mp) => mp.0.clone(),
        Geometry::Rect(r) => vec![r.to_polygon()],
        Geometry::Triangle(t) => vec![t.to_polygon()],
        Geometry::GeometryCollection(gc) => gc.iter().flat_map(polygons_of).collect(),
        _ => Vec::new(),
    }
}

fn is_valid_polygon(p: &Polygon<f64>) -> bool {
    let ring = &p.exterior().0;
    ring.len() >= 4
        && ring.iter().all(|c| c.x.is_finite() && c.y.is_finite())
        && p.unsigned_area() > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use footprint_core::vector::Feature;
    use geo::{line_string, polygon};

    fn boundary(geom: Geometry<f64>, crs: CRS) -> FeatureCollection {
        let mut fc = FeatureCollection::with_crs(crs);
        fc.push(Feature::new(geom));
        fc
    }

    fn params(cell_size: f64) -> TemplateParams {
        TemplateParams {
            cell_size,
            crs: CRS::from_epsg(32718),
            nodata: -9999.0,
        }
    }

    #[test]
    fn snaps_extent_to_cell_multiples() {
        let poly = polygon![(x: 1050.0, y: 2020.0), (x: 4900.0, y: 2020.0), (x: 4900.0, y: 5990.0), (x: 1050.0, y: 5990.0)];
        let area = build_template("pe", &boundary(poly.into(), CRS::from_epsg(32718)), &params(1000.0)).unwrap();

        let t = &area.template;
        assert_relative_eq!(t.transform.origin_x, 1000.0);
        assert_relative_eq!(t.transform.origin_y, 6000.0);
        assert_eq!((t.rows, t.cols), (4, 4));
        assert_eq!(area.inside_count(), 16);
    }

    #[test]
    fn triangle_mask_uses_cell_centres() {
        let tri = polygon![(x: 0.0, y: 0.0), (x: 4000.0, y: 0.0), (x: 0.0, y: 4000.0)];
        let area = build_template("tri", &boundary(tri.into(), CRS::from_epsg(32718)), &params(1000.0)).unwrap();
        // centres strictly below the diagonal x + y < 4000: 4 + 3 + 2 + 1 minus the diagonal ones
        assert_eq!(area.inside_count(), 6);
        assert!(area.contains(3, 0));
        assert!(!area.contains(0, 3));
    }

    #[test]
    fn reprojects_wgs84_boundary() {
        let poly = polygon![(x: -75.1, y: -10.1), (x: -74.9, y: -10.1), (x: -74.9, y: -9.9), (x: -75.1, y: -9.9)];
        let area = build_template("box", &boundary(poly.into(), CRS::wgs84()), &params(1000.0)).unwrap();
        let (min_x, _, max_x, _) = area.template.bounds();
        assert!(min_x < 500_000.0 && max_x > 500_000.0);
        assert!(area.template.cols >= 22 && area.template.cols <= 24);
    }

    #[test]
    fn rejects_boundary_without_polygons() {
        let line = line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 10.0)];
        let err = build_template("bad", &boundary(line.into(), CRS::from_epsg(32718)), &params(1.0)).unwrap_err();
        assert!(matches!(err, Error::InvalidGeometry(_)));
    }

    #[test]
    fn rejects_unsupported_projection() {
        let poly = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)];
        let mut p = params(1.0);
        p.crs = CRS::from_epsg(2154);
        let err = build_template("fr", &boundary(poly.into(), CRS::wgs84()), &p).unwrap_err();
        assert!(matches!(err, Error::UnsupportedProjection(_)));
    }

    #[test]
    fn check_detects_mismatch() {
        let t = GridTemplate::new(CRS::from_epsg(32718), GeoTransform::new(0.0, 10.0, 1.0, -1.0), 10, 10, -9999.0);
        assert!(t.check(&t.raster(0.0)).is_ok());

        let other = Raster::<f64>::new(10, 11);
        assert!(matches!(t.check(&other), Err(Error::GridMismatch(_))));

        let mut shifted = t.raster(0.0);
        shifted.set_transform(GeoTransform::new(0.5, 10.0, 1.0, -1.0));
        assert!(matches!(t.check(&shifted), Err(Error::GridMismatch(_))));

        let mut reprojected = t.raster(0.0);
        reprojected.set_crs(Some(CRS::wgs84()));
        assert!(matches!(t.check(&reprojected), Err(Error::GridMismatch(_))));
    }

    #[test]
    fn check_rejects_raster_without_crs() {
        let t = GridTemplate::new(CRS::from_epsg(32718), GeoTransform::new(0.0, 10.0, 1.0, -1.0), 10, 10, -9999.0);
        let mut bare = t.raster(0.0);
        bare.set_crs(None);
        let err = t.check(&bare).unwrap_err();
        assert!(matches!(err, Error::GridMismatch(ref msg) if msg.contains("no CRS")));
    }

    #[test]
    fn base_raster_roundtrip() {
        let tri = polygon![(x: 0.0, y: 0.0), (x: 4000.0, y: 0.0), (x: 0.0, y: 4000.0)];
        let area = build_template("tri", &boundary(tri.into(), CRS::from_epsg(32718)), &params(1000.0)).unwrap();
        let base = area.base_raster();
        let back = StudyArea::from_base_raster("tri", &base).unwrap();
        assert_eq!(back.mask.data(), area.mask.data());
        assert_eq!(back.template, area.template);
    }

    #[test]
    fn geographic_cell_area_shrinks_poleward() {
        let t = GridTemplate::new(CRS::wgs84(), GeoTransform::new(0.0, 60.0, 0.01, -0.01), 6000, 10, -9999.0);
        let equator = t.cell_area_km2(5999);
        let north = t.cell_area_km2(0);
        assert_relative_eq!(equator, 1.2364, epsilon = 1e-3);
        assert!(north < equator * 0.51);
    }
}
