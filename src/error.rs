/// Errors surfaced by tree construction, smoothing, and querying.
///
/// `StirlingCapacity` is recoverable by the caller (rebuild the generator
/// with a larger bound); the configuration variants are fail-fast.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("dataset is empty")]
    EmptyDataset,

    #[error("observation has {got} values but {expected} were expected (target plus covariates)")]
    RowLength { expected: usize, got: usize },

    #[error("value {value} is out of range for variable {variable} (arity {arity})")]
    ValueOutOfRange {
        variable: usize,
        value: usize,
        arity: usize,
    },

    #[error("tree has not been smoothed; call smooth() before querying")]
    NotSmoothed,

    #[error("log-Stirling cache cannot extend {dimension} to index {requested}; store stopped at {reached}")]
    StirlingCapacity {
        dimension: char,
        requested: usize,
        reached: usize,
    },
}
