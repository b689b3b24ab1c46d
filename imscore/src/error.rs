use thiserror::Error;

/// Errors raised by spectrum and dataset operations.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Invalid combination of arguments, e.g. neither or both of label and sample.
    #[error("{0}")]
    Usage(String),

    /// An argument value outside the supported set or range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Grids that must share a shape do not.
    #[error("shape mismatch for '{name}': expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        name: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// A dimension is not a multiple of the requested factor.
    #[error("dimension of length {len} is not divisible by {factor}")]
    NotDivisible { len: usize, factor: usize },

    /// A range collapsed to nothing (start >= end).
    #[error("degenerate range: start {start} >= end {end}")]
    DegenerateRange { start: f64, end: f64 },

    /// An interpolation coordinate lies outside the interpolant's domain.
    #[error("coordinate {x} outside interpolation domain [{lo}, {hi}] of '{name}'")]
    OutOfDomain { name: String, x: f64, lo: f64, hi: f64 },

    #[error("index {index} out of bounds for dataset of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Parallel sequences handed to a constructor differ in length.
    #[error("length mismatch: {data} spectra, {files} files, {samples} samples, {labels} labels")]
    LengthMismatch {
        data: usize,
        files: usize,
        samples: usize,
        labels: usize,
    },

    /// A sample group carries more than one label.
    #[error("sample '{sample}' has heterogeneous labels: {labels:?}")]
    HeterogeneousLabels { sample: String, labels: Vec<String> },

    #[error("dataset is empty")]
    Empty,
}

pub type Result<T> = std::result::Result<T, DatasetError>;
