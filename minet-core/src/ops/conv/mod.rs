//! 2D convolution.

pub mod conv2d;
mod im2col;

pub use conv2d::{conv2d_op, Conv2dGeometry};
