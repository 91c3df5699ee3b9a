//! Warping a source raster onto the grid template
//!
//! Each target cell is mapped into source pixel space through the CRS
//! transform. Point methods sample at the cell centre; aggregating methods
//! gather every source pixel whose centre lies in the cell's footprint.

use crate::maybe_rayon::*;
use crate::template::GridTemplate;
use footprint_core::{Error, Raster, Result, Transformer, CRS};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resampling method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleMethod {
    Nearest,
    Bilinear,
    /// Majority; ties resolve to the smallest value
    Mode,
    Average,
    Sum,
    Min,
    Max,
}

impl ResampleMethod {
    /// Whether output values are always source values (safe for categories)
    pub fn preserves_categories(&self) -> bool {
        matches!(self, ResampleMethod::Nearest | ResampleMethod::Mode)
    }

    fn aggregates(&self) -> bool {
        !matches!(self, ResampleMethod::Nearest | ResampleMethod::Bilinear)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResampleMethod::Nearest => "nearest",
            ResampleMethod::Bilinear => "bilinear",
            ResampleMethod::Mode => "mode",
            ResampleMethod::Average => "average",
            ResampleMethod::Sum => "sum",
            ResampleMethod::Min => "min",
            ResampleMethod::Max => "max",
        }
    }
}

impl fmt::Display for ResampleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for [`resample`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResampleParams {
    pub method: ResampleMethod,
    /// Divide results by the cell area in km² (counts per cell to density)
    #[serde(default)]
    pub density_per_km2: bool,
}

impl Default for ResampleParams {
    fn default() -> Self {
        Self {
            method: ResampleMethod::Nearest,
            density_per_km2: false,
        }
    }
}

/// Warp `source` (georeferenced in `source_crs`) onto `template`.
///
/// Output cells outside the source, or whose contributing pixels are all
/// nodata, receive the template nodata. Source NaN counts as nodata.
pub fn resample(
    source: &Raster<f64>,
    source_crs: &CRS,
    template: &GridTemplate,
    params: &ResampleParams,
) -> Result<Raster<f64>> {
    let to_source = Transformer::new(&template.crs, source_crs)?;
    let (rows, cols) = template.shape();
    let nodata = template.nodata;
    let gt = template.transform;
    let sampler = Sampler { source };

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut out = vec![nodata; cols];
            let area_km2 = template.cell_area_km2(row);

            // Corner rows of this target row, in source pixel space
            let corners: Vec<(f64, f64)> = if params.method.aggregates() {
                (0..=cols)
                    .flat_map(|col| [(col, row), (col, row + 1)])
                    .map(|(c, r)| {
                        let (x, y) = gt.pixel_to_geo_corner(c, r);
                        let (sx, sy) = to_source.transform(x, y);
                        source.geo_to_pixel(sx, sy)
                    })
                    .collect()
            } else {
                Vec::new()
            };

            for (col, cell) in out.iter_mut().enumerate() {
                let value = if params.method.aggregates() {
                    let quad = [
                        corners[2 * col],
                        corners[2 * col + 1],
                        corners[2 * col + 2],
                        corners[2 * col + 3],
                    ];
                    sampler.footprint(&quad, params.method)
                } else {
                    let (x, y) = gt.pixel_to_geo(col, row);
                    let (sx, sy) = to_source.transform(x, y);
                    let (fc, fr) = source.geo_to_pixel(sx, sy);
                    match params.method {
                        ResampleMethod::Bilinear => sampler.bilinear(fc, fr),
                        _ => sampler.nearest(fc, fr),
                    }
                };

                if let Some(v) = value {
                    *cell = if params.density_per_km2 { v / area_km2 } else { v };
                }
            }
            out
        })
        .collect();

    let mut out = template.raster(nodata);
    *out.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(out)
}

struct Sampler<'a> {
    source: &'a Raster<f64>,
}

impl Sampler<'_> {
    fn valid(&self, row: i64, col: i64) -> Option<f64> {
        if row < 0 || col < 0 {
            return None;
        }
        self.source.value_at(row as usize, col as usize)
    }

    fn nearest(&self, fc: f64, fr: f64) -> Option<f64> {
        if !(fc.is_finite() && fr.is_finite()) {
            return None;
        }
        self.valid(fr.floor() as i64, fc.floor() as i64)
    }

    /// Weighted over the four surrounding pixel centres, renormalized over
    /// the valid ones
    fn bilinear(&self, fc: f64, fr: f64) -> Option<f64> {
        if !(fc.is_finite() && fr.is_finite()) {
            return None;
        }
        let (rows, cols) = self.source.shape();
        if fc < 0.0 || fr < 0.0 || fc >= cols as f64 || fr >= rows as f64 {
            return None;
        }

        let u = fc - 0.5;
        let v = fr - 0.5;
        let c0 = u.floor();
        let r0 = v.floor();
        let tx = u - c0;
        let ty = v - r0;
        let (c0, r0) = (c0 as i64, r0 as i64);

        let mut sum = 0.0;
        let mut weight = 0.0;
        for (dr, dc, w) in [
            (0, 0, (1.0 - tx) * (1.0 - ty)),
            (0, 1, tx * (1.0 - ty)),
            (1, 0, (1.0 - tx) * ty),
            (1, 1, tx * ty),
        ] {
            if w <= 0.0 {
                continue;
            }
            if let Some(val) = self.valid(r0 + dr, c0 + dc) {
                sum += w * val;
                weight += w;
            }
        }

        (weight > 0.0).then(|| sum / weight)
    }

    /// Reduce the source pixels whose centres fall in the target footprint.
    ///
    /// A footprint narrower than a source pixel falls back to the nearest
    /// pixel, or for `Sum` to each touched pixel weighted by the fraction of
    /// it the footprint covers. The footprint is taken as its bounding box in
    /// source pixel space, which is exact for grids without rotation.
    fn footprint(&self, quad: &[(f64, f64); 4], method: ResampleMethod) -> Option<f64> {
        if quad.iter().any(|(c, r)| !(c.is_finite() && r.is_finite())) {
            return None;
        }
        let (rows, cols) = self.source.shape();

        let min_c = quad.iter().map(|q| q.0).fold(f64::INFINITY, f64::min);
        let max_c = quad.iter().map(|q| q.0).fold(f64::NEG_INFINITY, f64::max);
        let min_r = quad.iter().map(|q| q.1).fold(f64::INFINITY, f64::min);
        let max_r = quad.iter().map(|q| q.1).fold(f64::NEG_INFINITY, f64::max);

        if max_c <= 0.0 || max_r <= 0.0 || min_c >= cols as f64 || min_r >= rows as f64 {
            return None;
        }

        let c_start = (min_c - 0.5).ceil().max(0.0) as usize;
        let c_end = ((max_c - 0.5).ceil().max(0.0) as usize).min(cols);
        let r_start = (min_r - 0.5).ceil().max(0.0) as usize;
        let r_end = ((max_r - 0.5).ceil().max(0.0) as usize).min(rows);

        let sub_pixel = max_c - min_c < 1.0 || max_r - min_r < 1.0;
        if sub_pixel || c_start >= c_end || r_start >= r_end {
            if method == ResampleMethod::Sum {
                return self.covered_sum(min_c, max_c, min_r, max_r);
            }
            return self.nearest((min_c + max_c) / 2.0, (min_r + max_r) / 2.0);
        }

        let mut values: Vec<f64> = Vec::with_capacity((c_end - c_start) * (r_end - r_start));
        for r in r_start..r_end {
            for c in c_start..c_end {
                if let Some(v) = self.source.value_at(r, c) {
                    values.push(v);
                }
            }
        }
        if values.is_empty() {
            return None;
        }

        Some(match method {
            ResampleMethod::Sum => values.iter().sum(),
            ResampleMethod::Average => values.iter().sum::<f64>() / values.len() as f64,
            ResampleMethod::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            ResampleMethod::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            _ => majority(&mut values),
        })
    }

    /// Sum of the valid pixels under a box in pixel space, each weighted by
    /// the fraction of its area inside the box
    fn covered_sum(&self, min_c: f64, max_c: f64, min_r: f64, max_r: f64) -> Option<f64> {
        let (rows, cols) = self.source.shape();
        let overlap = |lo: f64, hi: f64, i: usize| (hi.min(i as f64 + 1.0) - lo.max(i as f64)).max(0.0);

        let c_range = (min_c.floor().max(0.0) as usize)..(max_c.ceil().max(0.0) as usize).min(cols);
        let r_range = (min_r.floor().max(0.0) as usize)..(max_r.ceil().max(0.0) as usize).min(rows);

        let mut sum = 0.0;
        let mut any = false;
        for r in r_range {
            let wr = overlap(min_r, max_r, r);
            for c in c_range.clone() {
                let w = wr * overlap(min_c, max_c, c);
                if w <= 0.0 {
                    continue;
                }
                if let Some(v) = self.source.value_at(r, c) {
                    sum += w * v;
                    any = true;
                }
            }
        }
        any.then_some(sum)
    }
}

/// Most frequent value; the smallest wins a tie
fn majority(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mut best = values[0];
    let mut best_count = 0;
    let mut i = 0;
    while i < values.len() {
        let mut j = i;
        while j < values.len() && values[j] == values[i] {
            j += 1;
        }
        if j - i > best_count {
            best_count = j - i;
            best = values[i];
        }
        i = j;
    }
    best
}
