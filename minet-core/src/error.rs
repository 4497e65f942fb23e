use thiserror::Error;

/// Error type shared by the tensor engine, the nn layers and the network crate.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum MinetError {
    #[error("Shape mismatch: expected {expected:?}, got {actual:?} during operation {operation}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
        operation: String,
    },

    #[error("Channel mismatch in {operation}: expected {expected} channels, got {actual}")]
    ChannelMismatch {
        operation: String,
        expected: usize,
        actual: usize,
    },

    #[error("Rank mismatch in {operation}: expected rank {expected}, got {actual}")]
    RankMismatch {
        expected: usize,
        actual: usize,
        operation: String,
    },

    #[error("Invalid input shape {shape:?}: {reason}")]
    InvalidInputShape { shape: Vec<usize>, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Tensor creation error: data length {data_len} does not match shape {shape:?}")]
    TensorCreationError { data_len: usize, shape: Vec<usize> },

    #[error("Backward called on non-scalar tensor without explicit gradient.")]
    BackwardNonScalar,

    #[error("Backward error: {0}")]
    BackwardError(String),

    #[error("Checkpoint segment '{segment}' was called without its gradient carrier")]
    MissingGradientCarrier { segment: String },

    #[error("Segment '{segment}' expects {expected} {direction}, got {actual}")]
    SegmentArity {
        segment: String,
        direction: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Internal error: {0}")]
    InternalError(String),
}
