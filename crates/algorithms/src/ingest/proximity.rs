//! Euclidean distance to the nearest feature cell
//!
//! Exact separable distance transform (Felzenszwalb & Huttenlocher, 2012):
//! a 1D lower-envelope pass down every column followed by one along every
//! row, with per-axis cell sizes so distances come out in CRS units.

use crate::maybe_rayon::*;
use footprint_core::{Error, Raster, Result};
use ndarray::Array2;

/// Distance (CRS units) from every cell centre to the nearest centre of a
/// cell for which `is_feature` holds.
///
/// Without any feature cell every distance is `+inf`.
pub fn proximity(source: &Raster<f64>, is_feature: impl Fn(f64) -> bool + Sync) -> Result<Raster<f64>> {
    let (rows, cols) = source.shape();
    let dx = source.transform().pixel_width.abs();
    let dy = source.transform().pixel_height.abs();

    // Column pass on squared distances, stored column-major
    let columns: Vec<Vec<f64>> = (0..cols)
        .into_par_iter()
        .map(|col| {
            let f: Vec<f64> = (0..rows)
                .map(|row| {
                    let v = unsafe { source.get_unchecked(row, col) };
                    if !source.is_nodata(v) && is_feature(v) {
                        0.0
                    } else {
                        f64::INFINITY
                    }
                })
                .collect();
            lower_envelope(&f, dy)
        })
        .collect();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let f: Vec<f64> = (0..cols).map(|col| columns[col][row]).collect();
            lower_envelope(&f, dx).into_iter().map(f64::sqrt).collect::<Vec<_>>()
        })
        .collect();

    let mut out = source.like(0.0);
    *out.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(out)
}

/// 1D squared distance transform of `f` sampled every `spacing` units
fn lower_envelope(f: &[f64], spacing: f64) -> Vec<f64> {
    let n = f.len();
    let mut out = vec![f64::INFINITY; n];

    let pos = |i: usize| i as f64 * spacing;
    let intersect = |q: usize, p: usize| {
        ((f[q] + pos(q) * pos(q)) - (f[p] + pos(p) * pos(p))) / (2.0 * (pos(q) - pos(p)))
    };

    // Parabola vertices and the boundaries between them
    let mut v: Vec<usize> = Vec::with_capacity(n);
    let mut z: Vec<f64> = Vec::with_capacity(n + 1);

    for q in (0..n).filter(|&q| f[q].is_finite()) {
        loop {
            match v.last() {
                None => {
                    v.push(q);
                    z.clear();
                    z.push(f64::NEG_INFINITY);
                    z.push(f64::INFINITY);
                    break;
                }
                Some(&p) => {
                    let s = intersect(q, p);
                    if s <= z[v.len() - 1] {
                        v.pop();
                        z.pop();
                    } else {
                        if let Some(upper) = z.last_mut() {
                            *upper = s;
                        }
                        v.push(q);
                        z.push(f64::INFINITY);
                        break;
                    }
                }
            }
        }
    }

    if v.is_empty() {
        return out;
    }

    let mut k = 0;
    for (i, slot) in out.iter_mut().enumerate() {
        let x = pos(i);
        while z[k + 1] < x {
            k += 1;
        }
        let d = x - pos(v[k]);
        *slot = d * d + f[v[k]];
    }
    out
}
