//! Combining scored layers into pressures and pressures into footprint maps

use crate::maybe_rayon::*;
use crate::template::StudyArea;
use footprint_core::{Error, Raster, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cell-wise reduction of pressure scores into the footprint value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum CombinationRule {
    /// Sum of pressures capped at the scheme maximum
    #[default]
    SumThenCap,
    /// Plain sum
    Sum,
    /// Strongest pressure
    Max,
    /// Weighted sum capped at the scheme maximum
    WeightedSum { weights: BTreeMap<String, f64> },
}

impl CombinationRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            CombinationRule::SumThenCap => "sum_then_cap",
            CombinationRule::Sum => "sum",
            CombinationRule::Max => "max",
            CombinationRule::WeightedSum { .. } => "weighted_sum",
        }
    }

    /// Weight of `pressure`; 1 for unweighted rules
    pub fn weight(&self, pressure: &str) -> Result<f64> {
        match self {
            CombinationRule::WeightedSum { weights } => weights.get(pressure).copied().ok_or_else(|| {
                Error::Configuration(format!("weighted_sum has no weight for pressure {pressure}"))
            }),
            _ => Ok(1.0),
        }
    }

    /// Every named pressure must carry a finite, non-negative weight
    pub fn validate<'a>(&self, pressures: impl IntoIterator<Item = &'a str>) -> Result<()> {
        if let CombinationRule::WeightedSum { weights } = self {
            for name in pressures {
                let w = self.weight(name)?;
                if !w.is_finite() || w < 0.0 {
                    return Err(Error::Configuration(format!(
                        "weight {w} of pressure {name} must be finite and non-negative"
                    )));
                }
            }
            if weights.is_empty() {
                return Err(Error::Configuration("weighted_sum without weights".into()));
            }
        }
        Ok(())
    }

    fn reduce(&self, acc: f64, value: f64, weight: f64) -> f64 {
        match self {
            CombinationRule::Max => acc.max(value),
            _ => acc + weight * value,
        }
    }

    fn finish(&self, value: f64, max_score: f64) -> f64 {
        match self {
            CombinationRule::SumThenCap | CombinationRule::WeightedSum { .. } => value.min(max_score),
            CombinationRule::Sum | CombinationRule::Max => value,
        }
    }
}

impl std::fmt::Display for CombinationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score raster of one pressure for one year
#[derive(Debug, Clone)]
pub struct PressureMap {
    pub name: String,
    pub year: i32,
    /// Layers that were combined into it
    pub layers: Vec<String>,
    pub raster: Raster<f64>,
}

/// Pressure that contributed to a footprint map
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contributor {
    pub pressure: String,
    pub weight: f64,
}

/// Human Footprint map of one year
#[derive(Debug, Clone)]
pub struct HumanFootprintMap {
    pub year: i32,
    pub scheme: String,
    pub rule: CombinationRule,
    pub contributors: Vec<Contributor>,
    pub raster: Raster<f64>,
}

/// Merge the scored layers of one pressure by cell maximum.
///
/// Cells where no layer has a value, and cells outside the area, are nodata.
pub fn combine_pressure(
    area: &StudyArea,
    name: &str,
    year: i32,
    layers: &[(&str, &Raster<f64>)],
) -> Result<PressureMap> {
    if layers.is_empty() {
        return Err(Error::NoContributingLayers(year));
    }
    for (_, raster) in layers {
        area.template.check(*raster)?;
    }

    let (rows, cols) = area.template.shape();
    let nodata = area.template.nodata;

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![nodata; cols];
            for (col, slot) in row_data.iter_mut().enumerate() {
                if !area.contains(row, col) {
                    continue;
                }
                let strongest = layers
                    .iter()
                    .filter_map(|(_, r)| r.value_at(row, col))
                    .fold(f64::NEG_INFINITY, f64::max);
                if strongest.is_finite() {
                    *slot = strongest;
                }
            }
            row_data
        })
        .collect();

    let mut raster = area.template.raster(nodata);
    *raster.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;

    let mut names: Vec<String> = layers.iter().map(|(n, _)| n.to_string()).collect();
    names.sort();

    Ok(PressureMap {
        name: name.to_string(),
        year,
        layers: names,
        raster,
    })
}

/// Combine pressure maps into the footprint map of `year`.
///
/// Pressures are reduced in name order so the result does not depend on the
/// order they are given in. Inside the area a missing pressure value counts
/// as zero; outside it the map is nodata.
pub fn aggregate(
    area: &StudyArea,
    scheme: &str,
    rule: &CombinationRule,
    max_score: f64,
    year: i32,
    pressures: &[PressureMap],
) -> Result<HumanFootprintMap> {
    if pressures.is_empty() {
        return Err(Error::NoContributingLayers(year));
    }

    let mut ordered: Vec<&PressureMap> = pressures.iter().collect();
    ordered.sort_by(|a, b| a.name.cmp(&b.name));

    let mut contributors = Vec::with_capacity(ordered.len());
    for p in &ordered {
        area.template.check(&p.raster)?;
        contributors.push(Contributor {
            pressure: p.name.clone(),
            weight: rule.weight(&p.name)?,
        });
    }

    let (rows, cols) = area.template.shape();
    let nodata = area.template.nodata;

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![nodata; cols];
            for (col, slot) in row_data.iter_mut().enumerate() {
                if !area.contains(row, col) {
                    continue;
                }
                let total = ordered.iter().zip(&contributors).fold(0.0, |acc, (p, c)| {
                    let value = p.raster.value_at(row, col).unwrap_or(0.0);
                    rule.reduce(acc, value, c.weight)
                });
                *slot = rule.finish(total, max_score);
            }
            row_data
        })
        .collect();

    let mut raster = area.template.raster(nodata);
    *raster.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;

    tracing::info!(
        year,
        scheme,
        rule = rule.as_str(),
        pressures = contributors.len(),
        "aggregated footprint map"
    );

    Ok(HumanFootprintMap {
        year,
        scheme: scheme.to_string(),
        rule: rule.clone(),
        contributors,
        raster,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::GridTemplate;
    use footprint_core::{GeoTransform, CRS};

    const ND: f64 = -9999.0;

    /// 1x3 area whose last cell is outside the boundary
    fn area() -> StudyArea {
        let template = GridTemplate::new(
            CRS::from_epsg(32718),
            GeoTransform::new(0.0, 1000.0, 1000.0, -1000.0),
            1,
            3,
            ND,
        );
        let mut mask: Raster<u8> = template.raster(0.0).with_same_meta(1);
        mask.set(0, 2, 0).unwrap();
        StudyArea {
            name: "test".into(),
            template,
            mask,
        }
    }

    fn pressure(area: &StudyArea, name: &str, values: [f64; 3]) -> PressureMap {
        let mut raster = area.template.raster(ND);
        for (col, v) in values.into_iter().enumerate() {
            raster.set(0, col, v).unwrap();
        }
        PressureMap {
            name: name.into(),
            year: 2020,
            layers: vec![name.into()],
            raster,
        }
    }

    fn values(r: &Raster<f64>) -> Vec<f64> {
        r.data().iter().copied().collect()
    }

    #[test]
    fn sum_then_cap() {
        let a = area();
        let p = [pressure(&a, "roads", [3.0, 8.0, 1.0]), pressure(&a, "lights", [4.0, 8.0, 1.0])];
        let map = aggregate(&a, "hf", &CombinationRule::SumThenCap, 10.0, 2020, &p).unwrap();
        assert_eq!(values(&map.raster), vec![7.0, 10.0, ND]);
        assert_eq!(map.contributors.len(), 2);
        assert_eq!(map.contributors[0].pressure, "lights");
    }

    #[test]
    fn nodata_pressure_counts_as_zero_inside() {
        let a = area();
        let p = [pressure(&a, "roads", [ND, 2.0, ND]), pressure(&a, "lights", [ND, ND, ND])];
        let map = aggregate(&a, "hf", &CombinationRule::SumThenCap, 10.0, 2020, &p).unwrap();
        assert_eq!(values(&map.raster), vec![0.0, 2.0, ND]);
    }

    #[test]
    fn order_independent() {
        let a = area();
        let x = pressure(&a, "a", [0.1, 0.7, 0.0]);
        let y = pressure(&a, "b", [0.2, 0.3, 0.0]);
        let z = pressure(&a, "c", [0.3, 0.9, 0.0]);
        let rule = CombinationRule::Sum;
        let one = aggregate(&a, "hf", &rule, 10.0, 2020, &[x.clone(), y.clone(), z.clone()]).unwrap();
        let two = aggregate(&a, "hf", &rule, 10.0, 2020, &[z, x, y]).unwrap();
        assert_eq!(values(&one.raster), values(&two.raster));
    }

    #[test]
    fn max_and_weighted_rules() {
        let a = area();
        let p = [pressure(&a, "roads", [3.0, 8.0, 0.0]), pressure(&a, "lights", [4.0, 8.0, 0.0])];

        let map = aggregate(&a, "hf", &CombinationRule::Max, 10.0, 2020, &p).unwrap();
        assert_eq!(values(&map.raster), vec![4.0, 8.0, ND]);

        let weights = BTreeMap::from([("roads".to_string(), 0.5), ("lights".to_string(), 2.0)]);
        let rule = CombinationRule::WeightedSum { weights };
        let map = aggregate(&a, "hf", &rule, 10.0, 2020, &p).unwrap();
        assert_eq!(values(&map.raster), vec![9.5, 10.0, ND]);
    }

    #[test]
    fn weighted_sum_requires_every_weight() {
        let rule = CombinationRule::WeightedSum {
            weights: BTreeMap::from([("roads".to_string(), 1.0)]),
        };
        assert!(rule.validate(["roads"]).is_ok());
        assert!(matches!(rule.validate(["roads", "lights"]), Err(Error::Configuration(_))));

        let a = area();
        let p = [pressure(&a, "lights", [1.0, 1.0, 1.0])];
        assert!(matches!(aggregate(&a, "hf", &rule, 10.0, 2020, &p), Err(Error::Configuration(_))));
    }

    #[test]
    fn no_pressures_is_an_error() {
        let a = area();
        let err = aggregate(&a, "hf", &CombinationRule::default(), 10.0, 2001, &[]).unwrap_err();
        assert!(matches!(err, Error::NoContributingLayers(2001)));
    }

    #[test]
    fn pressure_takes_cell_max() {
        let a = area();
        let roads = pressure(&a, "primary", [2.0, ND, 5.0]).raster;
        let tracks = pressure(&a, "tracks", [6.0, ND, 1.0]).raster;
        let p = combine_pressure(&a, "roads", 2020, &[("tracks", &tracks), ("primary", &roads)]).unwrap();
        assert_eq!(values(&p.raster), vec![6.0, ND, ND]);
        assert_eq!(p.layers, vec!["primary".to_string(), "tracks".to_string()]);
    }

    #[test]
    fn rule_from_json() {
        let rule: CombinationRule =
            serde_json::from_str(r#"{"rule": "weighted_sum", "weights": {"roads": 0.5}}"#).unwrap();
        assert_eq!(rule.weight("roads").unwrap(), 0.5);
        let rule: CombinationRule = serde_json::from_str(r#"{"rule": "max"}"#).unwrap();
        assert_eq!(rule, CombinationRule::Max);
    }
}
