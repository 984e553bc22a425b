use thiserror::Error;

/// Errors raised while validating arrays at call entry.
///
/// The numeric kernels themselves never fail; every variant here is detected
/// before any worker starts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GridError {
    #[error("feature grid has rank {rank}, expected {expected}")]
    Shape { rank: usize, expected: &'static str },

    #[error("reference vector has length {found}, grid feature axis has length {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("input is not a dense f64 array: {0}")]
    Type(String),

    #[error("worker count must be positive, got {0}")]
    ThreadCount(usize),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}

pub type Result<T> = std::result::Result<T, GridError>;
