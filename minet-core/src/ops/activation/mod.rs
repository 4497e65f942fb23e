//! # Activation Functions
//!
//! - [`relu_op`]: Rectified Linear Unit, used after every conv + batch-norm pair.
//! - [`sigmoid_op`]: logistic function, used by the classifier head to produce probabilities.

pub mod relu;
pub mod sigmoid;

pub use relu::relu_op;
pub use sigmoid::sigmoid_op;
