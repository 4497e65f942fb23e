//! Full reductions to a scalar, used to build losses in tests and harnesses.

pub mod mean;
pub mod sum;

pub use mean::mean_op;
pub use sum::sum_op;
