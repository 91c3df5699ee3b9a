//! Burning vector features onto a grid template
//!
//! Polygons are filled by scanline over cell centres (even-odd rule, so
//! holes stay empty). Lines and polygon outlines are traversed cell by cell,
//! which burns every cell a segment passes through. Points burn the cell
//! that contains them.

use crate::template::GridTemplate;
use footprint_core::vector::{AttributeValue, Feature, FeatureCollection};
use footprint_core::{Error, GeoTransform, Raster, Result};
use geo::{Coord, Geometry, LineString, Polygon};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What value a feature contributes to the cells it covers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BurnValue {
    /// 1.0 for every covered cell
    Presence,
    /// A numeric attribute, or a text attribute mapped through `codes`
    Attribute {
        field: String,
        #[serde(default)]
        codes: Option<BTreeMap<String, f64>>,
    },
}

/// Parameters for [`rasterize`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterizeParams {
    pub burn: BurnValue,
    /// Also burn polygon cells crossed by the outline
    #[serde(default)]
    pub all_touched: bool,
    /// Value for uncovered cells; nodata when `None`
    #[serde(default)]
    pub background: Option<f64>,
}

impl Default for RasterizeParams {
    fn default() -> Self {
        Self {
            burn: BurnValue::Presence,
            all_touched: true,
            background: Some(0.0),
        }
    }
}

/// Burn `features` (already in the template CRS) onto a new raster.
///
/// Features are burned in input order, so later features overwrite earlier
/// ones where they overlap. Features without geometry, or whose attribute is
/// missing or null, are skipped.
pub fn rasterize(
    layer: &str,
    features: &FeatureCollection,
    template: &GridTemplate,
    params: &RasterizeParams,
) -> Result<Raster<f64>> {
    let fill = params.background.unwrap_or(template.nodata);
    let mut out = template.raster(fill);
    let transform = template.transform;
    let (rows, cols) = (template.rows, template.cols);

    for feature in features.iter() {
        let Some(geometry) = &feature.geometry else {
            continue;
        };
        let Some(value) = burn_value(layer, feature, &params.burn)? else {
            continue;
        };

        let data = out.data_mut();
        visit_geometry(geometry, &transform, rows, cols, params.all_touched, &mut |r, c| {
            data[(r, c)] = value;
        });
    }

    Ok(out)
}

fn burn_value(layer: &str, feature: &Feature, burn: &BurnValue) -> Result<Option<f64>> {
    let (field, codes) = match burn {
        BurnValue::Presence => return Ok(Some(1.0)),
        BurnValue::Attribute { field, codes } => (field, codes),
    };

    let attr = match feature.get_property(field) {
        None | Some(AttributeValue::Null) => {
            tracing::debug!(layer, field = field.as_str(), "feature without attribute skipped");
            return Ok(None);
        }
        Some(a) => a,
    };

    if let Some(codes) = codes {
        let label = attr.as_label().unwrap_or_default();
        return codes
            .get(&label)
            .copied()
            .map(Some)
            .ok_or_else(|| Error::UnscoredCategory {
                layer: layer.to_string(),
                value: label,
            });
    }

    attr.as_f64().map(Some).ok_or_else(|| {
        Error::Configuration(format!(
            "attribute {field} of layer {layer} is not numeric; add a codes table for it"
        ))
    })
}

/// Call `visit(row, col)` for each cell covered by `geometry`
pub(crate) fn visit_geometry(
    geometry: &Geometry<f64>,
    transform: &GeoTransform,
    rows: usize,
    cols: usize,
    all_touched: bool,
    visit: &mut impl FnMut(usize, usize),
) {
    match geometry {
        Geometry::Point(p) => visit_point(p.0, transform, rows, cols, visit),
        Geometry::MultiPoint(mp) => {
            for p in mp.iter() {
                visit_point(p.0, transform, rows, cols, visit);
            }
        }
        Geometry::Line(l) => visit_segment(l.start, l.end, transform, rows, cols, visit),
        Geometry::LineString(ls) => visit_line_string(ls, transform, rows, cols, visit),
        Geometry::MultiLineString(mls) => {
            for ls in mls.iter() {
                visit_line_string(ls, transform, rows, cols, visit);
            }
        }
        Geometry::Polygon(poly) => visit_polygon(poly, transform, rows, cols, all_touched, visit),
        Geometry::MultiPolygon(mp) => {
            for poly in mp.iter() {
                visit_polygon(poly, transform, rows, cols, all_touched, visit);
            }
        }
        Geometry::Rect(rect) => {
            visit_polygon(&rect.to_polygon(), transform, rows, cols, all_touched, visit)
        }
        Geometry::Triangle(tri) => {
            visit_polygon(&tri.to_polygon(), transform, rows, cols, all_touched, visit)
        }
        Geometry::GeometryCollection(gc) => {
            for g in gc.iter() {
                visit_geometry(g, transform, rows, cols, all_touched, visit);
            }
        }
    }
}

fn visit_point(
    p: Coord<f64>,
    transform: &GeoTransform,
    rows: usize,
    cols: usize,
    visit: &mut impl FnMut(usize, usize),
) {
    let (fc, fr) = transform.geo_to_pixel(p.x, p.y);
    if fc >= 0.0 && fr >= 0.0 && fc < cols as f64 && fr < rows as f64 {
        visit(fr as usize, fc as usize);
    }
}

fn visit_line_string(
    ls: &LineString<f64>,
    transform: &GeoTransform,
    rows: usize,
    cols: usize,
    visit: &mut impl FnMut(usize, usize),
) {
    if ls.0.len() == 1 {
        visit_point(ls.0[0], transform, rows, cols, visit);
    }
    for seg in ls.lines() {
        visit_segment(seg.start, seg.end, transform, rows, cols, visit);
    }
}

/// Visit every cell a segment passes through (Amanatides-Woo traversal),
/// after clipping it to the grid in pixel space (Liang-Barsky).
fn visit_segment(
    a: Coord<f64>,
    b: Coord<f64>,
    transform: &GeoTransform,
    rows: usize,
    cols: usize,
    visit: &mut impl FnMut(usize, usize),
) {
    let p0 = transform.geo_to_pixel(a.x, a.y);
    let p1 = transform.geo_to_pixel(b.x, b.y);
    let Some((p0, p1)) = clip_to_grid(p0, p1, cols as f64, rows as f64) else {
        return;
    };

    let max_c = cols as i64 - 1;
    let max_r = rows as i64 - 1;
    let mut c = (p0.0.floor() as i64).clamp(0, max_c);
    let mut r = (p0.1.floor() as i64).clamp(0, max_r);
    let end_c = (p1.0.floor() as i64).clamp(0, max_c);
    let end_r = (p1.1.floor() as i64).clamp(0, max_r);

    let dx = p1.0 - p0.0;
    let dy = p1.1 - p0.1;
    let step_c = if dx > 0.0 { 1 } else { -1 };
    let step_r = if dy > 0.0 { 1 } else { -1 };
    let delta_c = if dx != 0.0 { (1.0 / dx).abs() } else { f64::INFINITY };
    let delta_r = if dy != 0.0 { (1.0 / dy).abs() } else { f64::INFINITY };
    let mut next_c = if dx > 0.0 {
        ((c + 1) as f64 - p0.0) / dx
    } else if dx < 0.0 {
        (c as f64 - p0.0) / dx
    } else {
        f64::INFINITY
    };
    let mut next_r = if dy > 0.0 {
        ((r + 1) as f64 - p0.1) / dy
    } else if dy < 0.0 {
        (r as f64 - p0.1) / dy
    } else {
        f64::INFINITY
    };

    let steps = (end_c - c).abs() + (end_r - r).abs();
    visit(r as usize, c as usize);
    for _ in 0..steps {
        if next_c < next_r {
            c += step_c;
            next_c += delta_c;
        } else {
            r += step_r;
            next_r += delta_r;
        }
        if (0..=max_c).contains(&c) && (0..=max_r).contains(&r) {
            visit(r as usize, c as usize);
        }
    }
}

fn clip_to_grid(
    p0: (f64, f64),
    p1: (f64, f64),
    width: f64,
    height: f64,
) -> Option<((f64, f64), (f64, f64))> {
    let dx = p1.0 - p0.0;
    let dy = p1.1 - p0.1;
    let mut t0: f64 = 0.0;
    let mut t1: f64 = 1.0;

    for (p, q) in [
        (-dx, p0.0),
        (dx, width - p0.0),
        (-dy, p0.1),
        (dy, height - p0.1),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let t = q / p;
            if p < 0.0 {
                t0 = t0.max(t);
            } else {
                t1 = t1.min(t);
            }
        }
    }

    if t0 > t1 || !t0.is_finite() || !t1.is_finite() {
        return None;
    }

    Some((
        (p0.0 + t0 * dx, p0.1 + t0 * dy),
        (p0.0 + t1 * dx, p0.1 + t1 * dy),
    ))
}

/// Scanline fill over cell centres.
///
/// Edge crossings are bucketed per row first so the cost is proportional
/// to the number of crossings rather than rows x edges.
fn visit_polygon(
    poly: &Polygon<f64>,
    transform: &GeoTransform,
    rows: usize,
    cols: usize,
    all_touched: bool,
    visit: &mut impl FnMut(usize, usize),
) {
    let mut crossings: Vec<Vec<f64>> = vec![Vec::new(); rows];

    for ring in std::iter::once(poly.exterior()).chain(poly.interiors().iter()) {
        for seg in ring.lines() {
            let (c0, r0) = transform.geo_to_pixel(seg.start.x, seg.start.y);
            let (c1, r1) = transform.geo_to_pixel(seg.end.x, seg.end.y);
            if r0 == r1 {
                continue;
            }

            // Rows whose centre line (r + 0.5) lies in [min(r0, r1), max(r0, r1))
            let (lo, hi) = if r0 < r1 { (r0, r1) } else { (r1, r0) };
            let first = (lo - 0.5).ceil().max(0.0);
            let last = (hi - 0.5).ceil().min(rows as f64);
            let mut row = first;
            while row < last {
                let yc = row + 0.5;
                let x = c0 + (yc - r0) * (c1 - c0) / (r1 - r0);
                crossings[row as usize].push(x);
                row += 1.0;
            }
        }
    }

    for (row, xs) in crossings.iter_mut().enumerate() {
        if xs.len() < 2 {
            continue;
        }
        xs.sort_by(|a, b| a.total_cmp(b));
        for pair in xs.chunks_exact(2) {
            let start = (pair[0] - 0.5).ceil().max(0.0) as usize;
            let end = ((pair[1] - 0.5).ceil().max(0.0) as usize).min(cols);
            for col in start..end {
                visit(row, col);
            }
        }
    }

    if all_touched {
        for ring in std::iter::once(poly.exterior()).chain(poly.interiors().iter()) {
            visit_line_string(ring, transform, rows, cols, visit);
        }
    }
}
