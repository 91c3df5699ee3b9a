//! Pure-Rust coordinate transforms between WGS84, Web Mercator and UTM.
//!
//! Transverse Mercator follows Snyder (1987), USGS Prof. Paper 1395,
//! pp. 61-64 (forward) and eqs. 8-12 to 8-25 (inverse). No libproj.

use super::CRS;
use crate::error::{Error, Result};
use std::f64::consts::FRAC_PI_4;

const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_223_563;
const E2: f64 = 2.0 * F - F * F;
const E_PRIME2: f64 = E2 / (1.0 - E2);
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Web Mercator clamps latitude to keep `y` finite
const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Projection {
    Geographic,
    WebMercator,
    Utm { zone: u32, north: bool },
}

impl Projection {
    fn resolve(crs: &CRS) -> Result<Self> {
        let code = crs
            .epsg()
            .ok_or_else(|| Error::UnsupportedProjection(crs.identifier()))?;
        match code {
            4326 => Ok(Projection::Geographic),
            3857 | 900913 => Ok(Projection::WebMercator),
            32601..=32660 => Ok(Projection::Utm { zone: code - 32600, north: true }),
            32701..=32760 => Ok(Projection::Utm { zone: code - 32700, north: false }),
            _ => Err(Error::UnsupportedProjection(crs.identifier())),
        }
    }

    fn unproject(self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Projection::Geographic => (x, y),
            Projection::WebMercator => {
                let lon = (x / A).to_degrees();
                let lat = (2.0 * (y / A).exp().atan() - 2.0 * FRAC_PI_4).to_degrees();
                (lon, lat)
            }
            Projection::Utm { zone, north } => utm_to_wgs84(x, y, zone, north),
        }
    }

    fn project(self, lon: f64, lat: f64) -> (f64, f64) {
        match self {
            Projection::Geographic => (lon, lat),
            Projection::WebMercator => {
                let lat = lat.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT);
                let x = A * lon.to_radians();
                let y = A * (FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
                (x, y)
            }
            Projection::Utm { zone, north } => wgs84_to_utm(lon, lat, zone, north),
        }
    }
}

/// Point transformer between two supported CRSs.
///
/// Equivalent CRSs (including unsupported ones) yield the identity.
#[derive(Debug, Clone, Copy)]
pub struct Transformer {
    steps: Option<(Projection, Projection)>,
}

impl Transformer {
    pub fn new(from: &CRS, to: &CRS) -> Result<Self> {
        if from.is_equivalent(to) {
            return Ok(Self { steps: None });
        }
        let src = Projection::resolve(from)?;
        let dst = Projection::resolve(to)?;
        Ok(Self {
            steps: (src != dst).then_some((src, dst)),
        })
    }

    pub fn is_identity(&self) -> bool {
        self.steps.is_none()
    }

    pub fn transform(&self, x: f64, y: f64) -> (f64, f64) {
        match self.steps {
            None => (x, y),
            Some((src, dst)) => {
                let (lon, lat) = src.unproject(x, y);
                dst.project(lon, lat)
            }
        }
    }

    /// Envelope of a transformed bbox, densified along its edges
    pub fn transform_bounds(&self, bounds: (f64, f64, f64, f64)) -> (f64, f64, f64, f64) {
        if self.is_identity() {
            return bounds;
        }
        let (min_x, min_y, max_x, max_y) = bounds;
        const STEPS: usize = 20;

        let mut out = (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for i in 0..=STEPS {
            let t = i as f64 / STEPS as f64;
            let x = min_x + t * (max_x - min_x);
            let y = min_y + t * (max_y - min_y);
            for (px, py) in [(x, min_y), (x, max_y), (min_x, y), (max_x, y)] {
                let (tx, ty) = self.transform(px, py);
                out.0 = out.0.min(tx);
                out.1 = out.1.min(ty);
                out.2 = out.2.max(tx);
                out.3 = out.3.max(ty);
            }
        }
        out
    }
}

fn central_meridian(zone: u32) -> f64 {
    ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians()
}

fn wgs84_to_utm(lon_deg: f64, lat_deg: f64, zone: u32, north: bool) -> (f64, f64) {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();
    let lon0 = central_meridian(zone);

    let sin_lat = lat.sin();
    let cos_lat = lat.cos();
    let tan_lat = lat.tan();

    let n = A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = E_PRIME2 * cos_lat * cos_lat;
    let a = cos_lat * (lon - lon0);
    let m = meridional_arc(lat);

    let a2 = a * a;
    let a4 = a2 * a2;
    let a6 = a4 * a2;

    let easting = K0
        * n
        * (a + (1.0 - t + c) * a2 * a / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * E_PRIME2) * a4 * a / 120.0)
        + FALSE_EASTING;

    let northing = K0
        * (m + n
            * tan_lat
            * (a2 / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * E_PRIME2) * a6 / 720.0));

    if north {
        (easting, northing)
    } else {
        (easting, northing + FALSE_NORTHING_SOUTH)
    }
}

fn utm_to_wgs84(easting: f64, northing: f64, zone: u32, north: bool) -> (f64, f64) {
    let x = easting - FALSE_EASTING;
    let y = if north { northing } else { northing - FALSE_NORTHING_SOUTH };

    let e4 = E2 * E2;
    let e6 = e4 * E2;
    let sqrt_1_e2 = (1.0 - E2).sqrt();
    let e1 = (1.0 - sqrt_1_e2) / (1.0 + sqrt_1_e2);

    let m = y / K0;
    let mu = m / (A * (1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

    // Footpoint latitude (Snyder eq. 3-26)
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let sin1 = phi1.sin();
    let cos1 = phi1.cos();
    let tan1 = phi1.tan();
    let denom = 1.0 - E2 * sin1 * sin1;

    let c1 = E_PRIME2 * cos1 * cos1;
    let t1 = tan1 * tan1;
    let n1 = A / denom.sqrt();
    let r1 = A * (1.0 - E2) / denom.powf(1.5);
    let d = x / (n1 * K0);

    let d2 = d * d;
    let d4 = d2 * d2;
    let d6 = d4 * d2;

    let lat = phi1
        - (n1 * tan1 / r1)
            * (d2 / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * E_PRIME2) * d4 / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                    - 252.0 * E_PRIME2
                    - 3.0 * c1 * c1)
                    * d6
                    / 720.0);

    let lon = central_meridian(zone)
        + (d - (1.0 + 2.0 * t1 + c1) * d2 * d / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * E_PRIME2 + 24.0 * t1 * t1)
                * d4
                * d
                / 120.0)
            / cos1;

    (lon.to_degrees(), lat.to_degrees())
}

/// Meridional arc from the equator to `lat` radians (Snyder eq. 3-21)
fn meridional_arc(lat: f64) -> f64 {
    let e4 = E2 * E2;
    let e6 = e4 * E2;

    A * ((1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
        - (3.0 * E2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64, msg: &str) {
        let diff = (a - b).abs();
        assert!(diff < tol, "{msg}: expected {b}, got {a}, diff {diff} exceeds {tol}");
    }

    // pyproj: Transformer.from_crs(4326, 32630, always_xy=True)
    //   .transform(-3.7037, 40.4168) -> (440298.94, 4474257.31)
    #[test]
    fn madrid_to_utm30n() {
        let t = Transformer::new(&CRS::wgs84(), &CRS::from_epsg(32630)).unwrap();
        let (e, n) = t.transform(-3.7037, 40.4168);
        assert_close(e, 440_298.94, 1.0, "easting");
        assert_close(n, 4_474_257.31, 1.0, "northing");
    }

    // pyproj: (-58.3816, -34.6037) in EPSG:32721 -> (373317.50, 6170036.17)
    #[test]
    fn buenos_aires_to_utm21s() {
        let t = Transformer::new(&CRS::wgs84(), &CRS::from_epsg(32721)).unwrap();
        let (e, n) = t.transform(-58.3816, -34.6037);
        assert_close(e, 373_317.50, 1.0, "easting");
        assert_close(n, 6_170_036.17, 1.0, "northing");
    }

    #[test]
    fn utm_roundtrip_lima() {
        let fwd = Transformer::new(&CRS::wgs84(), &CRS::from_epsg(32718)).unwrap();
        let inv = Transformer::new(&CRS::from_epsg(32718), &CRS::wgs84()).unwrap();

        for &(lon, lat) in &[(-77.0428, -12.0464), (-75.5, -9.0), (-73.1, -15.8)] {
            let (e, n) = fwd.transform(lon, lat);
            let (lon2, lat2) = inv.transform(e, n);
            assert_close(lon2, lon, 1e-6, "lon");
            assert_close(lat2, lat, 1e-6, "lat");
        }
    }

    #[test]
    fn mercator_roundtrip() {
        let fwd = Transformer::new(&CRS::wgs84(), &CRS::web_mercator()).unwrap();
        let inv = Transformer::new(&CRS::web_mercator(), &CRS::wgs84()).unwrap();

        let (x, y) = fwd.transform(180.0, 0.0);
        assert_close(x, 20_037_508.34, 0.01, "antimeridian x");
        assert_close(y, 0.0, 1e-6, "equator y");

        let (lon, lat) = inv.transform(fwd.transform(12.5, 41.9).0, fwd.transform(12.5, 41.9).1);
        assert_close(lon, 12.5, 1e-9, "lon");
        assert_close(lat, 41.9, 1e-9, "lat");
    }

    #[test]
    fn utm_to_utm_goes_through_geographic() {
        let t = Transformer::new(&CRS::from_epsg(32718), &CRS::from_epsg(32719)).unwrap();
        let (e, _) = t.transform(500_000.0, 8_000_000.0);
        // -75 deg is the 18S central meridian and lies 6 deg west of 19S's.
        assert!(e < 500_000.0);
    }

    #[test]
    fn identity_and_unsupported() {
        let crs = CRS::from_wkt("LOCAL_CS[\"grid\"]");
        assert!(Transformer::new(&crs, &crs.clone()).unwrap().is_identity());
        assert!(matches!(
            Transformer::new(&CRS::wgs84(), &CRS::from_epsg(2154)),
            Err(Error::UnsupportedProjection(_))
        ));
    }

    #[test]
    fn bounds_envelope_contains_corners() {
        let t = Transformer::new(&CRS::wgs84(), &CRS::from_epsg(32630)).unwrap();
        let (min_x, min_y, max_x, max_y) = t.transform_bounds((-3.75, 40.40, -3.70, 40.45));
        let (e, n) = t.transform(-3.75, 40.45);
        assert!(min_x <= e && e <= max_x && min_y <= n && n <= max_y);
        assert!(max_x - min_x > 3_000.0 && max_x - min_x < 6_000.0);
    }
}
