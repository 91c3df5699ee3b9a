//! Score tables: prepared value to influence score

use footprint_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// A named class of a categorical table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryClass {
    pub label: String,
    pub score: f64,
    /// Prepared values belonging to the class
    pub values: Vec<f64>,
}

/// A range of a binned table, closed on both ends: `[min, max]`.
///
/// `max: None` is unbounded. Neighbouring bins may share an edge; a value on
/// that edge takes the score of the first bin listed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBin {
    pub min: f64,
    #[serde(default)]
    pub max: Option<f64>,
    pub score: f64,
}

impl ScoreBin {
    pub fn new(min: f64, max: Option<f64>, score: f64) -> Self {
        Self { min, max, score }
    }
}

fn default_decay_scale() -> f64 {
    1000.0
}

fn default_bins() -> usize {
    10
}

/// Mapping from prepared values to scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoreTable {
    /// Exact match against listed values; anything else is an error
    Categories { classes: Vec<CategoryClass> },
    /// Ordered closed ranges, first match wins; values outside every range
    /// become nodata
    Bins { bins: Vec<ScoreBin> },
    /// Distance decay: `0` scores `max_score`, beyond `max_dist` scores 0,
    /// otherwise `max_score_exp * exp(-d / decay_scale) + min_score_exp`
    ExpDecay {
        max_score: f64,
        max_score_exp: f64,
        min_score_exp: f64,
        max_dist: f64,
        #[serde(default = "default_decay_scale")]
        decay_scale: f64,
    },
    /// `min(mult_factor * log10(v / scaling_factor + 1), max_score)`
    Log {
        max_score: f64,
        mult_factor: f64,
        scaling_factor: f64,
    },
    /// Equal-sample bins computed from the layer itself, scored 1..=number_bins
    Quantiles {
        #[serde(default = "default_bins")]
        number_bins: usize,
        #[serde(default)]
        min_threshold: f64,
    },
    /// Prepared values are already scores and pass through unchanged.
    /// The score range is checked per cell when the layer is scored.
    Remain,
}

impl ScoreTable {
    pub fn kind(&self) -> &'static str {
        match self {
            ScoreTable::Categories { .. } => "categories",
            ScoreTable::Bins { .. } => "bins",
            ScoreTable::ExpDecay { .. } => "exp_decay",
            ScoreTable::Log { .. } => "log",
            ScoreTable::Quantiles { .. } => "quantiles",
            ScoreTable::Remain => "remain",
        }
    }

    /// Tables matching exact values need category-preserving preparation
    pub fn is_categorical(&self) -> bool {
        matches!(self, ScoreTable::Categories { .. })
    }

    /// Check every score the table can emit lies in `[min, max]`
    pub fn validate(&self, name: &str, min: f64, max: f64) -> Result<()> {
        let check = |score: f64| {
            if score.is_finite() && score >= min && score <= max {
                Ok(())
            } else {
                Err(Error::ScoreOutOfRange {
                    table: name.to_string(),
                    score,
                    min,
                    max,
                })
            }
        };
        let invalid = |reason: String| Error::Configuration(format!("score table {name}: {reason}"));

        match self {
            ScoreTable::Categories { classes } => {
                if classes.is_empty() {
                    return Err(invalid("no classes".into()));
                }
                let mut seen: Vec<f64> = Vec::new();
                for class in classes {
                    check(class.score)?;
                    for &v in &class.values {
                        if seen.contains(&v) {
                            return Err(invalid(format!("value {v} listed in two classes")));
                        }
                        seen.push(v);
                    }
                }
            }
            ScoreTable::Bins { bins } => {
                if bins.is_empty() {
                    return Err(invalid("no bins".into()));
                }
                for (i, bin) in bins.iter().enumerate() {
                    check(bin.score)?;
                    let upper = bin.max.unwrap_or(f64::INFINITY);
                    if upper < bin.min {
                        return Err(invalid(format!("bin {i} is empty")));
                    }
                    if bin.max.is_none() && i + 1 != bins.len() {
                        return Err(invalid(format!("only the last bin may be unbounded, not bin {i}")));
                    }
                    if let Some(next) = bins.get(i + 1) {
                        if next.min < upper {
                            return Err(invalid(format!("bins {i} and {} overlap or are unordered", i + 1)));
                        }
                    }
                }
            }
            ScoreTable::ExpDecay {
                max_score,
                max_score_exp,
                min_score_exp,
                max_dist,
                decay_scale,
            } => {
                if !(*decay_scale > 0.0) || !(*max_dist >= 0.0) {
                    return Err(invalid("decay_scale must be positive and max_dist non-negative".into()));
                }
                check(*max_score)?;
                check(0.0)?;
                check(*min_score_exp)?;
                check(max_score_exp + min_score_exp)?;
            }
            ScoreTable::Log {
                max_score,
                mult_factor,
                scaling_factor,
            } => {
                if !(*scaling_factor > 0.0) || !(*mult_factor >= 0.0) {
                    return Err(invalid("scaling_factor must be positive and mult_factor non-negative".into()));
                }
                check(0.0)?;
                check(*max_score)?;
            }
            ScoreTable::Quantiles {
                number_bins,
                min_threshold,
            } => {
                if *number_bins == 0 || !min_threshold.is_finite() {
                    return Err(invalid("number_bins must be positive".into()));
                }
                check(0.0)?;
                check(*number_bins as f64)?;
            }
            ScoreTable::Remain => {}
        }
        Ok(())
    }
}

/// Quantile limits with midpoint interpolation over the sorted `values`:
/// `number_bins + 1` limits from the minimum to the maximum.
pub fn quantile_limits(values: &mut [f64], number_bins: usize) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();

    (0..=number_bins)
        .map(|i| {
            let pos = (n - 1) as f64 * i as f64 / number_bins as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            (values[lo] + values[hi]) / 2.0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_reject_out_of_range_score() {
        let table = ScoreTable::Categories {
            classes: vec![CategoryClass { label: "urban".into(), score: 12.0, values: vec![1.0] }],
        };
        let err = table.validate("lc", 0.0, 10.0).unwrap_err();
        assert!(matches!(err, Error::ScoreOutOfRange { score, .. } if score == 12.0));
    }

    #[test]
    fn categories_reject_duplicate_values() {
        let table = ScoreTable::Categories {
            classes: vec![
                CategoryClass { label: "a".into(), score: 1.0, values: vec![1.0, 2.0] },
                CategoryClass { label: "b".into(), score: 2.0, values: vec![2.0] },
            ],
        };
        assert!(matches!(table.validate("lc", 0.0, 10.0), Err(Error::Configuration(_))));
    }

    #[test]
    fn bins_must_be_ordered_and_disjoint() {
        let ok = ScoreTable::Bins {
            bins: vec![ScoreBin::new(0.0, Some(1.0), 10.0), ScoreBin::new(1.0, None, 0.0)],
        };
        assert!(ok.validate("roads", 0.0, 10.0).is_ok());

        let overlapping = ScoreTable::Bins {
            bins: vec![ScoreBin::new(0.0, Some(2.0), 10.0), ScoreBin::new(1.0, Some(3.0), 0.0)],
        };
        assert!(overlapping.validate("roads", 0.0, 10.0).is_err());

        let open_middle = ScoreTable::Bins {
            bins: vec![ScoreBin::new(0.0, None, 10.0), ScoreBin::new(5.0, Some(6.0), 0.0)],
        };
        assert!(open_middle.validate("roads", 0.0, 10.0).is_err());

        let point_bin = ScoreTable::Bins {
            bins: vec![ScoreBin::new(0.0, Some(0.0), 10.0), ScoreBin::new(0.0, Some(90.0), 8.0)],
        };
        assert!(point_bin.validate("rails", 0.0, 10.0).is_ok());
    }

    #[test]
    fn remain_defers_range_check() {
        assert!(ScoreTable::Remain.validate("mining", 0.0, 10.0).is_ok());
        assert!(!ScoreTable::Remain.is_categorical());
        let table: ScoreTable = serde_json::from_str(r#"{"kind": "remain"}"#).unwrap();
        assert_eq!(table, ScoreTable::Remain);
        assert_eq!(table.kind(), "remain");
    }

    #[test]
    fn exp_decay_peak_must_fit() {
        let table = ScoreTable::ExpDecay {
            max_score: 8.0,
            max_score_exp: 8.0,
            min_score_exp: 3.0,
            max_dist: 15_000.0,
            decay_scale: 1000.0,
        };
        assert!(matches!(
            table.validate("roads", 0.0, 10.0),
            Err(Error::ScoreOutOfRange { score, .. }) if score == 11.0
        ));
    }

    #[test]
    fn quantiles_fit_range() {
        let table = ScoreTable::Quantiles { number_bins: 12, min_threshold: 0.0 };
        assert!(table.validate("ntl", 0.0, 10.0).is_err());
        let table = ScoreTable::Quantiles { number_bins: 10, min_threshold: 0.5 };
        assert!(table.validate("ntl", 0.0, 10.0).is_ok());
    }

    #[test]
    fn midpoint_quantiles() {
        let mut values: Vec<f64> = (1..=5).map(f64::from).collect();
        let limits = quantile_limits(&mut values, 2);
        assert_eq!(limits, vec![1.0, 3.0, 5.0]);

        let mut values = vec![4.0, 1.0, 3.0, 2.0];
        // positions 0, 1.5, 3 -> 1, (2 + 3) / 2, 4
        assert_eq!(quantile_limits(&mut values, 2), vec![1.0, 2.5, 4.0]);
    }

    #[test]
    fn deserializes_tagged_tables() {
        let json = r#"{"kind": "exp_decay", "max_score": 8, "max_score_exp": 4, "min_score_exp": 4, "max_dist": 15000}"#;
        let table: ScoreTable = serde_json::from_str(json).unwrap();
        assert!(matches!(table, ScoreTable::ExpDecay { decay_scale, .. } if decay_scale == 1000.0));
    }
}
