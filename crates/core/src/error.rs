//! Error types for the footprint pipeline

use thiserror::Error;

/// Main error type for footprint operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster does not match the grid template: {0}")]
    GridMismatch(String),

    #[error("Invalid boundary geometry: {0}")]
    InvalidGeometry(String),

    #[error("Unsupported projection: {0}")]
    UnsupportedProjection(String),

    #[error("Cannot read source {path}: {reason}")]
    UnreadableSource { path: String, reason: String },

    #[error("CRS mismatch for {layer}: {reason}")]
    CrsMismatch { layer: String, reason: String },

    #[error("Layer {0} does not intersect the study area")]
    EmptyIntersection(String),

    #[error("Value {value} of layer {layer} has no entry in its score table")]
    UnscoredCategory { layer: String, value: String },

    #[error("Score table {table} can produce {score}, outside [{min}, {max}]")]
    ScoreOutOfRange {
        table: String,
        score: f64,
        min: f64,
        max: f64,
    },

    #[error("No snapshot of {layer} covers year {year}")]
    NoTemporalCoverage { layer: String, year: i32 },

    #[error("No layer contributes to year {0}")]
    NoContributingLayers(i32),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

/// Coarse classification deciding how far an error propagates in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad score table, method or weights: fails before any raster I/O
    Configuration,
    /// Problem with one source layer: only that unit is skipped
    SourceData,
    /// No snapshot for a requested year
    TemporalCoverage,
    /// Nothing to combine for a year
    Aggregation,
    /// File system or internal failure
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnscoredCategory { .. }
            | Error::ScoreOutOfRange { .. }
            | Error::Configuration(_)
            | Error::InvalidParameter { .. } => ErrorKind::Configuration,
            Error::UnreadableSource { .. }
            | Error::CrsMismatch { .. }
            | Error::EmptyIntersection(_)
            | Error::UnsupportedProjection(_)
            | Error::InvalidGeometry(_)
            | Error::GridMismatch(_) => ErrorKind::SourceData,
            Error::NoTemporalCoverage { .. } => ErrorKind::TemporalCoverage,
            Error::NoContributingLayers(_) => ErrorKind::Aggregation,
            Error::Io(_)
            | Error::InvalidDimensions { .. }
            | Error::IndexOutOfBounds { .. }
            | Error::Other(_) => ErrorKind::Internal,
        }
    }

    /// Wrap a decoder/parser failure for `path` as an unreadable source.
    pub fn unreadable(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        Error::UnreadableSource {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for footprint operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(
            Error::UnscoredCategory { layer: "lc".into(), value: "4".into() }.kind(),
            ErrorKind::Configuration
        );
        assert_eq!(Error::EmptyIntersection("roads".into()).kind(), ErrorKind::SourceData);
        assert_eq!(
            Error::NoTemporalCoverage { layer: "pop".into(), year: 2008 }.kind(),
            ErrorKind::TemporalCoverage
        );
        assert_eq!(Error::NoContributingLayers(2020).kind(), ErrorKind::Aggregation);
    }

    #[test]
    fn unreadable_keeps_path() {
        let e = Error::unreadable("/data/pop.tif", "truncated");
        assert_eq!(e.to_string(), "Cannot read source /data/pop.tif: truncated");
    }
}
