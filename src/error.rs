use thiserror::Error;

pub type Result<T> = std::result::Result<T, EmgError>;

#[derive(Debug, Error)]
pub enum EmgError {
    /// A parameter or signal shape is unusable. Raised before any processing.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// No threshold candidate produced at least two heel strikes.
    #[error(
        "heel-strike detection failed: no k in [{k_min:.2}, {k_max:.2}] ({n_candidates} candidates) \
         gave >= 2 events (median={median:.4}, mad={mad:.4}, min_burst={min_burst} samples, \
         min_gap={min_gap} samples, offset={offset} samples). \
         Try lowering the k range or min_gap_ms, or check signal quality."
    )]
    DetectionFailure {
        k_min: f64,
        k_max: f64,
        n_candidates: usize,
        median: f64,
        mad: f64,
        min_burst: usize,
        min_gap: usize,
        offset: i64,
    },

    #[error("filter design failed: {0}")]
    Filter(String),
}
