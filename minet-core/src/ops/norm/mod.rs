//! Normalization ops.

pub mod batch_norm;

pub use batch_norm::{batch_norm_op, BatchNormMode, BatchStats};
