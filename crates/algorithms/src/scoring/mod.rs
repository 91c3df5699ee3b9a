//! Converting prepared layers to influence scores
//!
//! A [`ScoringScheme`] names a score range, the rule that combines pressures
//! and a set of [`ScoreTable`]s. Scoring is per cell and row-parallel; nodata
//! in is nodata out.

mod table;

pub use table::{quantile_limits, CategoryClass, ScoreBin, ScoreTable};

use crate::aggregate::CombinationRule;
use crate::layer::{PreparedLayer, ScoredLayer};
use crate::maybe_rayon::*;
use footprint_core::{Error, Raster, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named set of score tables sharing one score range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringScheme {
    pub name: String,
    #[serde(default)]
    pub min_score: f64,
    #[serde(default = "default_max_score")]
    pub max_score: f64,
    #[serde(default)]
    pub combination: CombinationRule,
    pub tables: BTreeMap<String, ScoreTable>,
}

fn default_max_score() -> f64 {
    10.0
}

impl ScoringScheme {
    pub fn new(name: impl Into<String>, min_score: f64, max_score: f64) -> Self {
        Self {
            name: name.into(),
            min_score,
            max_score,
            combination: CombinationRule::default(),
            tables: BTreeMap::new(),
        }
    }

    pub fn with_table(mut self, name: impl Into<String>, table: ScoreTable) -> Self {
        self.tables.insert(name.into(), table);
        self
    }

    pub fn with_combination(mut self, rule: CombinationRule) -> Self {
        self.combination = rule;
        self
    }

    pub fn table(&self, name: &str) -> Result<&ScoreTable> {
        self.tables.get(name).ok_or_else(|| {
            Error::Configuration(format!("scheme {} has no score table {name}", self.name))
        })
    }

    /// Reject tables able to emit scores outside `[min_score, max_score]`
    pub fn validate(&self) -> Result<()> {
        if !(self.min_score < self.max_score) {
            return Err(Error::Configuration(format!(
                "scheme {}: min_score {} must be below max_score {}",
                self.name, self.min_score, self.max_score
            )));
        }
        for (name, table) in &self.tables {
            table.validate(name, self.min_score, self.max_score)?;
        }
        Ok(())
    }
}

/// Score table lookup compiled for one raster
enum Scorer<'a> {
    Categories(Vec<(f64, f64)>),
    Bins(&'a [ScoreBin]),
    ExpDecay {
        max_score: f64,
        max_score_exp: f64,
        min_score_exp: f64,
        max_dist: f64,
        decay_scale: f64,
    },
    Log {
        max_score: f64,
        mult_factor: f64,
        scaling_factor: f64,
    },
    Quantiles {
        limits: Vec<f64>,
        min_threshold: f64,
    },
    Remain,
}

/// Result of scoring a single value
enum Outcome {
    Value(f64),
    Nodata,
    Unmatched,
}

impl<'a> Scorer<'a> {
    fn compile(table: &'a ScoreTable, raster: &Raster<f64>) -> Self {
        match table {
            ScoreTable::Categories { classes } => Scorer::Categories(
                classes
                    .iter()
                    .flat_map(|c| c.values.iter().map(move |&v| (v, c.score)))
                    .collect(),
            ),
            ScoreTable::Bins { bins } => Scorer::Bins(bins),
            ScoreTable::ExpDecay {
                max_score,
                max_score_exp,
                min_score_exp,
                max_dist,
                decay_scale,
            } => Scorer::ExpDecay {
                max_score: *max_score,
                max_score_exp: *max_score_exp,
                min_score_exp: *min_score_exp,
                max_dist: *max_dist,
                decay_scale: *decay_scale,
            },
            ScoreTable::Log {
                max_score,
                mult_factor,
                scaling_factor,
            } => Scorer::Log {
                max_score: *max_score,
                mult_factor: *mult_factor,
                scaling_factor: *scaling_factor,
            },
            ScoreTable::Quantiles {
                number_bins,
                min_threshold,
            } => {
                let mut values: Vec<f64> = raster
                    .data()
                    .iter()
                    .copied()
                    .filter(|&v| !raster.is_nodata(v) && v != 0.0 && v >= *min_threshold)
                    .collect();
                Scorer::Quantiles {
                    limits: quantile_limits(&mut values, *number_bins),
                    min_threshold: *min_threshold,
                }
            }
            ScoreTable::Remain => Scorer::Remain,
        }
    }

    fn score(&self, value: f64) -> Outcome {
        match self {
            Scorer::Categories(lookup) => lookup
                .iter()
                .find(|(v, _)| *v == value)
                .map_or(Outcome::Unmatched, |&(_, s)| Outcome::Value(s)),
            Scorer::Bins(bins) => bins
                .iter()
                .find(|b| value >= b.min && b.max.is_none_or(|max| value <= max))
                .map_or(Outcome::Nodata, |b| Outcome::Value(b.score)),
            Scorer::ExpDecay {
                max_score,
                max_score_exp,
                min_score_exp,
                max_dist,
                decay_scale,
            } => {
                if value < 0.0 {
                    Outcome::Nodata
                } else if value == 0.0 {
                    Outcome::Value(*max_score)
                } else if value > *max_dist {
                    Outcome::Value(0.0)
                } else {
                    Outcome::Value(max_score_exp * (-value / decay_scale).exp() + min_score_exp)
                }
            }
            Scorer::Log {
                max_score,
                mult_factor,
                scaling_factor,
            } => {
                if value < 0.0 {
                    Outcome::Nodata
                } else {
                    let s = mult_factor * (value / scaling_factor + 1.0).log10();
                    Outcome::Value(s.min(*max_score))
                }
            }
            Scorer::Quantiles {
                limits,
                min_threshold,
            } => {
                if value == 0.0 || value < *min_threshold || limits.len() < 2 {
                    return Outcome::Value(0.0);
                }
                let bins = limits.len() - 1;
                // Inclusive bounds, first match wins, open-ended top bin
                for i in 0..bins {
                    let upper = if i + 1 == bins { f64::INFINITY } else { limits[i + 1] };
                    if value >= limits[i] && value <= upper {
                        return Outcome::Value((i + 1) as f64);
                    }
                }
                Outcome::Value(0.0)
            }
            Scorer::Remain => Outcome::Value(value),
        }
    }
}

/// Score a prepared raster through one table.
///
/// The output shares the input grid and nodata. Values matching no category
/// fail with [`Error::UnscoredCategory`]; values outside every bin and
/// negative inputs to continuous tables become nodata. A `remain` table
/// copies values as they are; [`score_layer`] checks them against the scheme.
pub fn score_raster(raster: &Raster<f64>, table: &ScoreTable, layer: &str) -> Result<Raster<f64>> {
    let (rows, cols) = raster.shape();
    let nodata = raster.nodata().unwrap_or(f64::NAN);
    let scorer = Scorer::compile(table, raster);

    let data: Vec<Vec<f64>> = (0..rows)
        .into_par_iter()
        .map(|row| {
            let mut row_data = vec![nodata; cols];
            for (col, slot) in row_data.iter_mut().enumerate() {
                let val = unsafe { raster.get_unchecked(row, col) };
                if raster.is_nodata(val) {
                    continue;
                }
                match scorer.score(val) {
                    Outcome::Value(s) => *slot = s,
                    Outcome::Nodata => {}
                    Outcome::Unmatched => {
                        return Err(Error::UnscoredCategory {
                            layer: layer.to_string(),
                            value: val.to_string(),
                        })
                    }
                }
            }
            Ok(row_data)
        })
        .collect::<Result<_>>()?;

    let mut output = raster.like(nodata);
    output.set_nodata(Some(nodata));
    *output.data_mut() = Array2::from_shape_vec((rows, cols), data.concat())
        .map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

/// Score a prepared layer with the named table of `scheme`
pub fn score_layer(prepared: &PreparedLayer, scheme: &ScoringScheme, table: &str) -> Result<ScoredLayer> {
    let score_table = scheme.table(table)?;
    if score_table.is_categorical() && !prepared.method.preserves_categories() {
        return Err(Error::Configuration(format!(
            "layer {}: categorical table {table} cannot score {} output",
            prepared.identity, prepared.method
        )));
    }

    let raster = score_raster(&prepared.raster, score_table, &prepared.identity.layer)?;
    if matches!(score_table, ScoreTable::Remain) {
        check_range(&raster, table, scheme.min_score, scheme.max_score)?;
    }
    let stats = raster.statistics();
    tracing::debug!(
        layer = %prepared.identity,
        table,
        kind = score_table.kind(),
        min = ?stats.min,
        max = ?stats.max,
        "scored layer"
    );

    Ok(ScoredLayer {
        identity: prepared.identity.clone(),
        table: table.to_string(),
        raster,
    })
}

/// Fail on the first valid cell outside `[min, max]`
fn check_range(raster: &Raster<f64>, table: &str, min: f64, max: f64) -> Result<()> {
    match raster
        .data()
        .iter()
        .find(|&&v| !raster.is_nodata(v) && !(v >= min && v <= max))
    {
        Some(&score) => Err(Error::ScoreOutOfRange {
            table: table.to_string(),
            score,
            min,
            max,
        }),
        None => Ok(()),
    }
}
